//! Display-frame scheduling.
//!
//! The host (a window redraw, or a test) calls [`FrameClock::fire`] once per display
//! refresh. A request fires at most once; after that it must be requested again.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameRequest(u64);

#[derive(Debug, Default)]
pub struct FrameClock {
    next_id: u64,
    pending: Option<FrameRequest>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a callback for the next display frame. Only one request is kept; a
    /// newer request replaces an older one that has not fired yet.
    pub fn request_frame(&mut self) -> FrameRequest {
        self.next_id += 1;
        let request = FrameRequest(self.next_id);
        if let Some(stale) = self.pending.replace(request) {
            log::trace!("frame request {:?} superseded by {:?}", stale, request);
        }
        request
    }

    /// Drops the pending request. Returns false when it already fired or nothing was
    /// requested.
    pub fn cancel_pending(&mut self) -> bool {
        match self.pending.take() {
            Some(request) => {
                log::trace!("frame request {:?} cancelled", request);
                true
            }
            None => false,
        }
    }

    /// Consumes the pending request, if any. Called by the host once per display frame.
    pub fn fire(&mut self) -> Option<FrameRequest> {
        self.pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}
