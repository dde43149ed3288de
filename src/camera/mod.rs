//! Camera capability and the video sink the capture controller attaches streams to.

#[cfg(feature = "camera-nokhwa")]
mod convert;
#[cfg(feature = "camera-nokhwa")]
mod device;

use std::time::Duration;

use crate::{
    error::{CaptureError, CaptureResult},
    types::{Frame, Resolution},
};

#[cfg(feature = "camera-nokhwa")]
pub use self::device::{CameraDevice, NokhwaCamera, available_cameras};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FacingMode {
    /// Front camera, facing the user.
    User,
    Environment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamConstraints {
    pub width: u32,
    pub height: u32,
    pub facing_mode: FacingMode,
}

/// Grants access to a camera. Every call opens a new stream.
pub trait CameraSource {
    fn request_video_stream(
        &mut self,
        constraints: &StreamConstraints,
    ) -> CaptureResult<Box<dyn MediaStream>>;
}

/// A live capture session.
pub trait MediaStream {
    /// Blocks until the stream knows its native resolution.
    fn wait_for_metadata(&mut self, timeout: Duration) -> CaptureResult<Resolution>;

    /// Most recent frame delivered since the last call, if any.
    fn current_frame(&mut self) -> Option<Frame>;

    /// Stops every track of the stream. Calling it again has no effect.
    fn stop_tracks(&mut self);

    fn is_live(&self) -> bool;
}

/// Holds the attached stream and the last frame it delivered.
#[derive(Default)]
pub struct VideoSink {
    stream: Option<Box<dyn MediaStream>>,
    native: Option<Resolution>,
    last_frame: Option<Frame>,
}

impl VideoSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, stream: Box<dyn MediaStream>) {
        if let Some(mut previous) = self.stream.replace(stream) {
            log::warn!("replacing a stream that was still attached");
            previous.stop_tracks();
        }
        self.native = None;
        self.last_frame = None;
    }

    /// Waits for the attached stream to report its size and remembers it.
    pub fn load_metadata(&mut self, timeout: Duration) -> CaptureResult<Resolution> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(CaptureError::PlaybackFailure("no stream attached".to_string()));
        };
        let resolution = stream.wait_for_metadata(timeout)?;
        if resolution.is_empty() {
            return Err(CaptureError::PlaybackFailure(format!(
                "stream reported an empty resolution {}x{}",
                resolution.width, resolution.height
            )));
        }
        self.native = Some(resolution);
        Ok(resolution)
    }

    pub fn native_resolution(&self) -> Option<Resolution> {
        self.native
    }

    /// Newest frame from the stream, falling back to the previously delivered one.
    pub fn current_frame(&mut self) -> Option<&Frame> {
        if let Some(stream) = self.stream.as_mut() {
            if let Some(frame) = stream.current_frame() {
                self.last_frame = Some(frame);
            }
        }
        self.last_frame.as_ref()
    }

    pub fn is_attached(&self) -> bool {
        self.stream.is_some()
    }

    /// Stops and drops the attached stream. Returns false when nothing was attached.
    pub fn detach(&mut self) -> bool {
        self.native = None;
        self.last_frame = None;
        match self.stream.take() {
            Some(mut stream) => {
                stream.stop_tracks();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::{
        cell::RefCell,
        collections::VecDeque,
        rc::Rc,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use super::*;

    /// Per-track stop counters shared between a fake stream and the test.
    #[derive(Clone, Debug, Default)]
    pub struct TrackLog {
        stops: Arc<Vec<AtomicUsize>>,
    }

    impl TrackLog {
        pub fn with_tracks(count: usize) -> Self {
            Self {
                stops: Arc::new((0..count).map(|_| AtomicUsize::new(0)).collect()),
            }
        }

        pub fn stop_counts(&self) -> Vec<usize> {
            self.stops.iter().map(|c| c.load(Ordering::SeqCst)).collect()
        }
    }

    pub struct FakeStream {
        resolution: Option<Resolution>,
        tracks: TrackLog,
        live: Vec<bool>,
        steady_frame: Option<Frame>,
    }

    impl FakeStream {
        pub fn new(resolution: Resolution, tracks: TrackLog) -> Self {
            let count = tracks.stops.len();
            Self {
                resolution: Some(resolution),
                tracks,
                live: vec![true; count],
                steady_frame: Some(Frame::solid(
                    resolution.width,
                    resolution.height,
                    [40, 40, 40, 255],
                )),
            }
        }

        pub fn without_metadata(tracks: TrackLog) -> Self {
            let mut stream = Self::new(Resolution::new(1, 1), tracks);
            stream.resolution = None;
            stream
        }
    }

    impl MediaStream for FakeStream {
        fn wait_for_metadata(&mut self, _timeout: Duration) -> CaptureResult<Resolution> {
            self.resolution.ok_or_else(|| {
                CaptureError::PlaybackFailure("metadata never arrived".to_string())
            })
        }

        fn current_frame(&mut self) -> Option<Frame> {
            self.steady_frame.clone()
        }

        fn stop_tracks(&mut self) {
            for (idx, live) in self.live.iter_mut().enumerate() {
                if *live {
                    *live = false;
                    self.tracks.stops[idx].fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        fn is_live(&self) -> bool {
            self.live.iter().any(|&l| l)
        }
    }

    #[derive(Clone)]
    pub enum Grant {
        Allow(Resolution),
        AllowWithoutMetadata,
        Deny(CaptureError),
    }

    /// Camera that answers each request from a script and records the constraints it saw.
    #[derive(Clone)]
    pub struct FakeCamera {
        pub grants: Rc<RefCell<VecDeque<Grant>>>,
        pub requests: Rc<RefCell<Vec<StreamConstraints>>>,
        pub streams: Rc<RefCell<Vec<TrackLog>>>,
        pub tracks_per_stream: usize,
    }

    impl FakeCamera {
        pub fn granting(resolution: Resolution) -> Self {
            Self::scripted(vec![Grant::Allow(resolution)])
        }

        pub fn denying(err: CaptureError) -> Self {
            Self::scripted(vec![Grant::Deny(err)])
        }

        pub fn scripted(grants: Vec<Grant>) -> Self {
            Self {
                grants: Rc::new(RefCell::new(grants.into())),
                requests: Rc::new(RefCell::new(Vec::new())),
                streams: Rc::new(RefCell::new(Vec::new())),
                tracks_per_stream: 2,
            }
        }

        pub fn request_count(&self) -> usize {
            self.requests.borrow().len()
        }

        pub fn stream_log(&self, idx: usize) -> TrackLog {
            self.streams.borrow()[idx].clone()
        }
    }

    impl CameraSource for FakeCamera {
        fn request_video_stream(
            &mut self,
            constraints: &StreamConstraints,
        ) -> CaptureResult<Box<dyn MediaStream>> {
            self.requests.borrow_mut().push(*constraints);
            let grant = self
                .grants
                .borrow_mut()
                .pop_front()
                .unwrap_or(Grant::Allow(Resolution::new(640, 480)));
            let log = TrackLog::with_tracks(self.tracks_per_stream);
            let stream = match grant {
                Grant::Allow(resolution) => FakeStream::new(resolution, log.clone()),
                Grant::AllowWithoutMetadata => FakeStream::without_metadata(log.clone()),
                Grant::Deny(err) => return Err(err),
            };
            self.streams.borrow_mut().push(log);
            Ok(Box::new(stream))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{FakeStream, TrackLog};
    use super::*;

    #[test]
    fn detach_stops_tracks_once() {
        let log = TrackLog::with_tracks(3);
        let mut sink = VideoSink::new();
        sink.attach(Box::new(FakeStream::new(Resolution::new(4, 4), log.clone())));
        assert!(sink.detach());
        assert!(!sink.detach());
        assert_eq!(log.stop_counts(), vec![1, 1, 1]);
        assert!(!sink.is_attached());
    }

    #[test]
    fn metadata_sets_native_resolution() {
        let mut sink = VideoSink::new();
        assert!(sink.load_metadata(Duration::from_millis(1)).is_err());

        sink.attach(Box::new(FakeStream::new(
            Resolution::new(640, 480),
            TrackLog::with_tracks(1),
        )));
        let resolution = sink.load_metadata(Duration::from_millis(1)).unwrap();
        assert_eq!(resolution, Resolution::new(640, 480));
        assert_eq!(sink.native_resolution(), Some(resolution));
        assert!(sink.current_frame().is_some());
    }

    #[test]
    fn missing_metadata_is_a_playback_failure() {
        let mut sink = VideoSink::new();
        sink.attach(Box::new(FakeStream::without_metadata(TrackLog::with_tracks(1))));
        assert!(matches!(
            sink.load_metadata(Duration::from_millis(1)),
            Err(CaptureError::PlaybackFailure(_))
        ));
    }
}
