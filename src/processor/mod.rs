//! Frame processors turn the current video frame into a list of hands.

mod delegated;
mod mock;
mod ort;

use std::time::Duration;

use crate::{
    config::{AppConfig, ProcessorKind},
    error::CaptureResult,
    types::{Frame, Hand},
};

pub use self::delegated::{DelegatedProcessor, DetectorConfig, HandDetector};
pub use self::mock::{MockProcessor, simulate_hand};
pub use self::ort::OrtHandDetector;

pub trait FrameProcessor {
    /// Fails with `ModelNotReady` while a backing model is still loading.
    fn ensure_ready(&mut self) -> CaptureResult<()>;

    /// `elapsed` is the time since the render loop started.
    fn process(&mut self, frame: &Frame, elapsed: Duration) -> CaptureResult<Vec<Hand>>;

    fn label(&self) -> &'static str;
}

/// Picks the processor implementation named by the configuration.
pub fn build_processor(config: &AppConfig) -> Box<dyn FrameProcessor> {
    match config.processor {
        ProcessorKind::Mock => {
            log::info!("using simulated hand processor");
            Box::new(MockProcessor::new(config.max_hands))
        }
        ProcessorKind::Detector => {
            let detector_config = DetectorConfig {
                max_hands: config.max_hands,
                model_path: config.model_path.clone(),
                ..DetectorConfig::default()
            };
            log::info!(
                "using hand detector backed by {}",
                detector_config.model_path.display()
            );
            Box::new(DelegatedProcessor::spawn(detector_config, OrtHandDetector::initialize))
        }
    }
}
