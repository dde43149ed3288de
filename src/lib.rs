//! Live camera view with a hand landmark overlay.
//!
//! [`CaptureController`] owns the camera stream and drives the per-display-frame
//! render loop; a [`FrameProcessor`] (simulated or model-backed) produces the hands
//! that [`OverlayRenderer`] paints over each frame.

pub mod camera;
pub mod config;
pub mod controller;
pub mod error;
pub mod model_download;
pub mod overlay;
pub mod processor;
pub mod render_loop;
pub mod scheduler;
pub mod skeleton;
pub mod types;

pub use config::{AppConfig, ProcessorKind};
pub use controller::CaptureController;
pub use error::{CaptureError, CaptureResult};
pub use overlay::{ConfidenceGate, GateMode, OverlayRenderer, OverlayStyle, Surface};
pub use processor::{FrameProcessor, build_processor};
pub use render_loop::TickOutcome;
pub use types::{ActivityState, Frame, Hand, Landmark, Resolution};
