use std::path::Path;

use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::Tensor,
};
use rayon::prelude::*;

use super::delegated::{DetectorConfig, HandDetector};
use crate::{
    model_download::ensure_handpose_model_ready,
    skeleton::NUM_LANDMARKS,
    types::{Frame, Hand, Handedness, Landmark},
};

pub const INPUT_SIZE: u32 = 224;

#[derive(Clone, Debug, PartialEq)]
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    orig_w: u32,
    orig_h: u32,
}

/// MediaPipe hand-pose estimator run through ONNX Runtime on the whole frame.
pub struct OrtHandDetector {
    session: Session,
    min_confidence: f32,
}

impl OrtHandDetector {
    pub fn initialize(config: &DetectorConfig) -> Result<Self> {
        ensure_handpose_model_ready(&config.model_path, |_event| {}).with_context(|| {
            format!(
                "failed to prepare handpose model at {}",
                config.model_path.display()
            )
        })?;
        Self::from_model(&config.model_path, config.min_detection_confidence)
    }

    fn from_model(model_path: &Path, min_confidence: f32) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load ORT session from {}", model_path.display()))?;

        Ok(Self {
            session,
            min_confidence,
        })
    }
}

impl HandDetector for OrtHandDetector {
    fn estimate(&mut self, frame: &Frame) -> Result<Vec<Hand>> {
        let (input, letterbox) = letterbox_frame(frame, INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run ORT session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("model returned no outputs"));
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let scalar = |idx: usize| -> f32 {
            if outputs.len() > idx {
                outputs[idx]
                    .try_extract_array::<f32>()
                    .ok()
                    .and_then(|arr| arr.iter().next().copied())
                    .unwrap_or(0.0)
            } else {
                0.0
            }
        };
        let confidence = scalar(1).clamp(0.0, 1.0);
        let handedness = scalar(2);

        if confidence < self.min_confidence {
            return Ok(Vec::new());
        }

        let raw = decode_landmarks(&flattened)?;
        let landmarks = project_landmarks(&raw, &letterbox)
            .into_iter()
            .enumerate()
            .map(|(joint, (x, y))| Landmark {
                x,
                y,
                score: confidence,
                joint,
            })
            .collect();

        Ok(vec![Hand {
            landmarks,
            score: confidence,
            handedness: Handedness::from_score(handedness),
        }])
    }
}

/// Scales the frame into a black `target_size` square keeping its aspect ratio and
/// returns the normalized NHWC tensor.
fn letterbox_frame(frame: &Frame, target_size: u32) -> Result<(Array4<f32>, LetterboxInfo)> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len || expected_len == 0 {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }

    let scale = target_size as f32 / (frame.width.max(frame.height) as f32);
    let new_w = ((frame.width as f32 * scale).round() as u32).clamp(1, target_size);
    let new_h = ((frame.height as f32 * scale).round() as u32).clamp(1, target_size);

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    let resized = dst_image.into_vec();

    let pad_x = ((target_size - new_w) / 2) as usize;
    let pad_y = ((target_size - new_h) / 2) as usize;
    let side = target_size as usize;
    let mut canvas = vec![0u8; side * side * 4];
    let src_stride = new_w as usize * 4;
    for row in 0..(new_h as usize) {
        let dst_offset = ((pad_y + row) * side + pad_x) * 4;
        canvas[dst_offset..dst_offset + src_stride]
            .copy_from_slice(&resized[row * src_stride..(row + 1) * src_stride]);
    }

    let normalized: Vec<f32> = canvas
        .par_chunks_exact(4)
        .flat_map_iter(|px| {
            [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ]
        })
        .collect();
    let input = Array4::<f32>::from_shape_vec((1, side, side, 3), normalized)
        .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    Ok((
        input,
        LetterboxInfo {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            orig_w: frame.width,
            orig_h: frame.height,
        },
    ))
}

fn decode_landmarks(flat: &[f32]) -> Result<Vec<[f32; 3]>> {
    if flat.len() < NUM_LANDMARKS * 3 {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            NUM_LANDMARKS * 3
        ));
    }
    Ok(flat
        .chunks_exact(3)
        .take(NUM_LANDMARKS)
        .map(|c| [c[0], c[1], c[2]])
        .collect())
}

fn project_landmarks(landmarks: &[[f32; 3]], letterbox: &LetterboxInfo) -> Vec<(f32, f32)> {
    landmarks
        .iter()
        .map(|[x, y, _z]| {
            let px = (x - letterbox.pad_x) / letterbox.scale;
            let py = (y - letterbox.pad_y) / letterbox.scale;
            (
                px.clamp(0.0, letterbox.orig_w.saturating_sub(1) as f32),
                py.clamp(0.0, letterbox.orig_h.saturating_sub(1) as f32),
            )
        })
        .collect()
}
