use std::{path::PathBuf, time::Duration};

use crate::{
    camera::{FacingMode, StreamConstraints},
    model_download::default_handpose_model_path,
    overlay::{ConfidenceGate, OverlayStyle},
};

pub const PREFERRED_WIDTH: u32 = 640;
pub const PREFERRED_HEIGHT: u32 = 480;
pub const MAX_HANDS: usize = 2;
pub const CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const PROCESS_INTERVAL: Duration = Duration::from_millis(33);
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessorKind {
    Mock,
    Detector,
}

impl ProcessorKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mock" | "simulated" => Some(ProcessorKind::Mock),
            "detector" | "ort" => Some(ProcessorKind::Detector),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub constraints: StreamConstraints,
    pub camera_index: Option<u32>,
    pub processor: ProcessorKind,
    pub max_hands: usize,
    pub gate: ConfidenceGate,
    pub throttle: Option<Duration>,
    pub metadata_timeout: Duration,
    pub style: OverlayStyle,
    pub model_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            constraints: StreamConstraints {
                width: PREFERRED_WIDTH,
                height: PREFERRED_HEIGHT,
                facing_mode: FacingMode::User,
            },
            camera_index: None,
            processor: ProcessorKind::Detector,
            max_hands: MAX_HANDS,
            gate: ConfidenceGate::strict(CONFIDENCE_THRESHOLD),
            throttle: Some(PROCESS_INTERVAL),
            metadata_timeout: METADATA_TIMEOUT,
            style: OverlayStyle::default(),
            model_path: default_handpose_model_path(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Applies `HANDPOSE_*` overrides on top of the defaults. Unparseable values are
    /// logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("HANDPOSE_PROCESSOR") {
            match ProcessorKind::parse(&value) {
                Some(kind) => config.processor = kind,
                None => log::warn!("ignoring unknown HANDPOSE_PROCESSOR value {value:?}"),
            }
        }

        if let Some(value) = lookup("HANDPOSE_MODEL_PATH") {
            if !value.trim().is_empty() {
                config.model_path = PathBuf::from(value);
            }
        }

        if let Some(value) = lookup("HANDPOSE_THRESHOLD_INCLUSIVE") {
            match parse_flag(&value) {
                Some(true) => config.gate = ConfidenceGate::inclusive(CONFIDENCE_THRESHOLD),
                Some(false) => config.gate = ConfidenceGate::strict(CONFIDENCE_THRESHOLD),
                None => log::warn!("ignoring HANDPOSE_THRESHOLD_INCLUSIVE value {value:?}"),
            }
        }

        if let Some(value) = lookup("HANDPOSE_THROTTLE_MS") {
            match value.trim().parse::<u64>() {
                Ok(0) => config.throttle = None,
                Ok(ms) => config.throttle = Some(Duration::from_millis(ms)),
                Err(err) => log::warn!("ignoring HANDPOSE_THROTTLE_MS value {value:?}: {err}"),
            }
        }

        if let Some(value) = lookup("HANDPOSE_CAMERA_INDEX") {
            match value.trim().parse::<u32>() {
                Ok(index) => config.camera_index = Some(index),
                Err(err) => log::warn!("ignoring HANDPOSE_CAMERA_INDEX value {value:?}: {err}"),
            }
        }

        config
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::overlay::GateMode;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_match_capture_policy() {
        let config = AppConfig::default();
        assert_eq!(config.constraints.width, 640);
        assert_eq!(config.constraints.height, 480);
        assert_eq!(config.constraints.facing_mode, FacingMode::User);
        assert_eq!(config.max_hands, 2);
        assert_eq!(config.gate.mode, GateMode::Strict);
        assert_eq!(config.throttle, Some(Duration::from_millis(33)));
        assert_eq!(config.processor, ProcessorKind::Detector);
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = config_from(&[
            ("HANDPOSE_PROCESSOR", "Mock"),
            ("HANDPOSE_THRESHOLD_INCLUSIVE", "yes"),
            ("HANDPOSE_THROTTLE_MS", "0"),
            ("HANDPOSE_CAMERA_INDEX", "2"),
            ("HANDPOSE_MODEL_PATH", "/tmp/hand.onnx"),
        ]);
        assert_eq!(config.processor, ProcessorKind::Mock);
        assert_eq!(config.gate.mode, GateMode::Inclusive);
        assert_eq!(config.throttle, None);
        assert_eq!(config.camera_index, Some(2));
        assert_eq!(config.model_path, PathBuf::from("/tmp/hand.onnx"));
    }

    #[test]
    fn bad_values_keep_defaults() {
        let config = config_from(&[
            ("HANDPOSE_PROCESSOR", "magic"),
            ("HANDPOSE_THROTTLE_MS", "fast"),
            ("HANDPOSE_THRESHOLD_INCLUSIVE", "maybe"),
        ]);
        assert_eq!(config.processor, ProcessorKind::Detector);
        assert_eq!(config.throttle, Some(PROCESS_INTERVAL));
        assert_eq!(config.gate.mode, GateMode::Strict);
    }
}
