use std::time::{Duration, Instant};

use crate::{
    camera::{CameraSource, StreamConstraints, VideoSink},
    config::AppConfig,
    error::{CaptureError, CaptureResult},
    overlay::{OverlayRenderer, Surface},
    processor::FrameProcessor,
    render_loop::{RenderLoop, TickOutcome},
    types::{ActivityState, Resolution},
};

type StateListener = Box<dyn FnMut(ActivityState, ActivityState)>;

/// Owns the camera stream and the render loop for one view.
///
/// All mutation of the activity state, the stream handle and the hand count goes
/// through this type: at most one stream is live, and ticks only run while
/// [`ActivityState::Active`].
pub struct CaptureController<C: CameraSource> {
    camera: C,
    constraints: StreamConstraints,
    metadata_timeout: Duration,
    processor: Box<dyn FrameProcessor>,
    sink: VideoSink,
    surface: Surface,
    renderer: OverlayRenderer,
    render_loop: RenderLoop,
    state: ActivityState,
    hand_count: usize,
    message: Option<String>,
    listener: Option<StateListener>,
}

impl<C: CameraSource> CaptureController<C> {
    pub fn new(camera: C, processor: Box<dyn FrameProcessor>, config: &AppConfig) -> Self {
        Self {
            camera,
            constraints: config.constraints,
            metadata_timeout: config.metadata_timeout,
            processor,
            sink: VideoSink::new(),
            surface: Surface::default(),
            renderer: OverlayRenderer::new(config.style, config.gate),
            render_loop: RenderLoop::new(config.throttle),
            state: ActivityState::Idle,
            hand_count: 0,
            message: None,
            listener: None,
        }
    }

    /// Called with `(from, to)` on every state change.
    pub fn set_state_listener<F>(&mut self, listener: F)
    where
        F: FnMut(ActivityState, ActivityState) + 'static,
    {
        self.listener = Some(Box::new(listener));
    }

    pub fn state(&self) -> ActivityState {
        self.state
    }

    pub fn hand_count(&self) -> usize {
        self.hand_count
    }

    /// User-facing text for the last failure or blocked start, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn native_resolution(&self) -> Option<Resolution> {
        self.sink.native_resolution()
    }

    pub fn is_tick_pending(&self) -> bool {
        self.render_loop.is_scheduled()
    }

    pub fn ticks_run(&self) -> u64 {
        self.render_loop.ticks()
    }

    pub fn processor_label(&self) -> &'static str {
        self.processor.label()
    }

    /// Acquires the camera and starts the render loop. A no-op while a stream is live.
    pub fn start(&mut self) -> CaptureResult<()> {
        if matches!(self.state, ActivityState::Starting | ActivityState::Active) {
            log::debug!("start ignored, controller is {}", self.state.label());
            return Ok(());
        }

        if let Err(err) = self.processor.ensure_ready() {
            log::warn!("start blocked: {err}");
            self.message = Some(err.user_message());
            return Err(err);
        }

        self.message = None;
        self.transition(ActivityState::Starting);

        match self.acquire() {
            Ok(resolution) => {
                log::info!(
                    "capture active at {}x{} with {} processor",
                    resolution.width,
                    resolution.height,
                    self.processor.label()
                );
                Ok(())
            }
            Err(err) => {
                if err.is_acquisition_failure() {
                    log::error!("camera start failed: {err}");
                } else {
                    log::warn!("start aborted: {err}");
                }
                self.sink.detach();
                self.message = Some(err.user_message());
                self.transition(ActivityState::Error);
                Err(err)
            }
        }
    }

    fn acquire(&mut self) -> CaptureResult<Resolution> {
        log::debug!(
            "requesting {}x{} stream facing {:?}",
            self.constraints.width,
            self.constraints.height,
            self.constraints.facing_mode
        );
        let stream = self.camera.request_video_stream(&self.constraints)?;
        self.sink.attach(stream);
        let resolution = self.sink.load_metadata(self.metadata_timeout)?;
        self.surface.resize(resolution);

        self.render_loop.reset();
        self.render_loop.schedule();
        self.transition(ActivityState::Active);
        Ok(resolution)
    }

    /// Cancels the pending tick, releases the stream and clears the surface.
    pub fn stop(&mut self) {
        let cancelled = self.render_loop.cancel();
        let detached = self.sink.detach();
        if !cancelled && !detached && self.state == ActivityState::Idle {
            return;
        }

        self.surface.clear();
        self.hand_count = 0;
        self.message = None;
        self.transition(ActivityState::Idle);
        log::info!("capture stopped");
    }

    /// Host callback for each display refresh.
    pub fn on_display_frame(&mut self, now: Instant) -> TickOutcome {
        if !self.render_loop.take_due() {
            return TickOutcome::NotScheduled;
        }
        if self.state != ActivityState::Active {
            log::debug!("render loop ended, controller is {}", self.state.label());
            return TickOutcome::Terminated;
        }

        let outcome = self.render_loop.run_tick(
            now,
            &mut self.sink,
            self.processor.as_mut(),
            &mut self.surface,
            &self.renderer,
        );
        if let TickOutcome::Rendered { hands } = outcome {
            self.hand_count = hands;
        }

        self.render_loop.schedule();
        outcome
    }

    fn transition(&mut self, next: ActivityState) {
        let previous = self.state;
        if previous == next {
            return;
        }
        self.state = next;
        log::debug!("capture state {} -> {}", previous.label(), next.label());
        if let Some(listener) = self.listener.as_mut() {
            listener(previous, next);
        }
    }
}

impl<C: CameraSource> Drop for CaptureController<C> {
    fn drop(&mut self) {
        self.stop();
    }
}
