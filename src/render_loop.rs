use std::time::{Duration, Instant};

use crate::{
    camera::VideoSink,
    overlay::{OverlayRenderer, Surface},
    processor::FrameProcessor,
    scheduler::FrameClock,
};

/// What a display-frame callback did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// No tick was scheduled.
    NotScheduled,
    /// A tick fired while the controller was not active; the loop ended.
    Terminated,
    /// Too soon after the last processed frame. Surface left as is.
    Throttled,
    /// The stream has not delivered a frame yet.
    AwaitingFrame,
    Rendered { hands: usize },
    /// The frame was drawn but the processor failed on it.
    DetectionFailed,
    DrawFailed,
}

impl TickOutcome {
    pub fn ran(&self) -> bool {
        !matches!(self, TickOutcome::NotScheduled | TickOutcome::Terminated)
    }
}

#[derive(Clone, Debug)]
pub struct Throttle {
    interval: Duration,
    last_processed: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_processed: None,
        }
    }

    /// True when enough time passed since the last admitted tick.
    pub fn admit(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_processed {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }
        self.last_processed = Some(now);
        true
    }

    pub fn reset(&mut self) {
        self.last_processed = None;
    }
}

/// Drives one capture/process/draw cycle per display frame. The clock holds the
/// single outstanding frame request.
#[derive(Debug)]
pub struct RenderLoop {
    clock: FrameClock,
    throttle: Option<Throttle>,
    started_at: Option<Instant>,
    ticks: u64,
}

impl RenderLoop {
    pub fn new(throttle: Option<Duration>) -> Self {
        Self {
            clock: FrameClock::new(),
            throttle: throttle.map(Throttle::new),
            started_at: None,
            ticks: 0,
        }
    }

    pub fn schedule(&mut self) {
        let request = self.clock.request_frame();
        log::trace!("scheduled tick {request:?}");
    }

    /// Cancels the outstanding request. Returns false when nothing was scheduled.
    pub fn cancel(&mut self) -> bool {
        self.clock.cancel_pending()
    }

    pub fn is_scheduled(&self) -> bool {
        self.clock.has_pending()
    }

    /// Forgets timing from a previous run.
    pub fn reset(&mut self) {
        self.started_at = None;
        self.ticks = 0;
        if let Some(throttle) = self.throttle.as_mut() {
            throttle.reset();
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Fires the display frame. True when a tick was due.
    pub fn take_due(&mut self) -> bool {
        self.clock.fire().is_some()
    }

    /// Runs one tick body. Never reschedules; the caller does that on every outcome.
    pub fn run_tick(
        &mut self,
        now: Instant,
        sink: &mut VideoSink,
        processor: &mut dyn FrameProcessor,
        surface: &mut Surface,
        renderer: &OverlayRenderer,
    ) -> TickOutcome {
        self.ticks += 1;
        let started_at = *self.started_at.get_or_insert(now);

        if let Some(throttle) = self.throttle.as_mut() {
            if !throttle.admit(now) {
                return TickOutcome::Throttled;
            }
        }

        let Some(frame) = sink.current_frame() else {
            return TickOutcome::AwaitingFrame;
        };

        if let Err(err) = surface.draw_frame(frame) {
            log::warn!("failed to draw video frame: {err:?}");
            return TickOutcome::DrawFailed;
        }

        let elapsed = now.saturating_duration_since(started_at);
        match processor.process(frame, elapsed) {
            Ok(hands) => {
                renderer.render(surface, &hands);
                TickOutcome::Rendered { hands: hands.len() }
            }
            Err(err) => {
                log::warn!("{} processor failed on frame: {err}", processor.label());
                renderer.render(surface, &[]);
                TickOutcome::DetectionFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_admits_at_interval() {
        let t0 = Instant::now();
        let mut throttle = Throttle::new(Duration::from_millis(33));
        assert!(throttle.admit(t0));
        assert!(!throttle.admit(t0 + Duration::from_millis(32)));
        assert!(throttle.admit(t0 + Duration::from_millis(33)));
        assert!(!throttle.admit(t0 + Duration::from_millis(40)));
        throttle.reset();
        assert!(throttle.admit(t0 + Duration::from_millis(41)));
    }

    #[test]
    fn cancel_nulls_the_handle() {
        let mut render_loop = RenderLoop::new(None);
        render_loop.schedule();
        assert!(render_loop.is_scheduled());
        assert!(render_loop.cancel());
        assert!(!render_loop.is_scheduled());
        assert!(!render_loop.cancel());
        assert!(!render_loop.take_due());
    }

    #[test]
    fn scheduled_tick_is_due_once() {
        let mut render_loop = RenderLoop::new(None);
        render_loop.schedule();
        assert!(render_loop.take_due());
        assert!(!render_loop.take_due());
    }
}
