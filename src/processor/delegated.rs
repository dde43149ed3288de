use std::{
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{
    Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError, bounded,
};

use super::FrameProcessor;
use crate::{
    config::{CONFIDENCE_THRESHOLD, MAX_HANDS},
    error::{CaptureError, CaptureResult},
    model_download::default_handpose_model_path,
    types::{Frame, Hand},
};

/// External hand-pose detector. Runs on the processor's worker thread.
pub trait HandDetector {
    fn estimate(&mut self, frame: &Frame) -> anyhow::Result<Vec<Hand>>;
}

#[derive(Clone, Debug)]
pub struct DetectorConfig {
    pub max_hands: usize,
    pub model_variant: String,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    pub model_path: PathBuf,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_hands: MAX_HANDS,
            model_variant: "full".to_string(),
            min_detection_confidence: CONFIDENCE_THRESHOLD,
            min_tracking_confidence: CONFIDENCE_THRESHOLD,
            model_path: default_handpose_model_path(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Readiness {
    Loading,
    Ready,
    Failed(String),
}

type DetectionReply = anyhow::Result<Vec<Hand>>;

/// Hands frames to a detector living on a worker thread without ever waiting on it.
///
/// At most one frame is with the worker. Each `process` call collects a finished
/// reply if there is one, submits the current frame when the worker is idle, and
/// returns the most recent completed detection.
pub struct DelegatedProcessor {
    request_tx: Option<Sender<Frame>>,
    reply_rx: Receiver<DetectionReply>,
    ready_rx: Receiver<Result<(), String>>,
    readiness: Readiness,
    in_flight: bool,
    latest: Vec<Hand>,
    handle: Option<thread::JoinHandle<()>>,
}

impl DelegatedProcessor {
    /// Starts initializing the detector in the background. The processor reports
    /// `ModelNotReady` until `initialize` returns.
    pub fn spawn<F, D>(config: DetectorConfig, initialize: F) -> Self
    where
        F: FnOnce(&DetectorConfig) -> anyhow::Result<D> + Send + 'static,
        D: HandDetector,
    {
        let (request_tx, request_rx) = bounded::<Frame>(1);
        let (reply_tx, reply_rx) = bounded::<DetectionReply>(1);
        let (ready_tx, ready_rx) = bounded(1);

        let spawned = thread::Builder::new()
            .name("hand-detector".into())
            .spawn(move || {
                let detector = match initialize(&config) {
                    Ok(detector) => {
                        log::info!(
                            "hand detector ready (variant {}, max {} hands)",
                            config.model_variant,
                            config.max_hands
                        );
                        let _ = ready_tx.send(Ok(()));
                        detector
                    }
                    Err(err) => {
                        log::error!("failed to initialize hand detector: {err:?}");
                        let _ = ready_tx.send(Err(format!("{err:#}")));
                        return;
                    }
                };
                run_worker_loop(detector, config.max_hands, request_rx, reply_tx);
            });

        let (handle, readiness) = match spawned {
            Ok(handle) => (Some(handle), Readiness::Loading),
            Err(err) => (
                None,
                Readiness::Failed(format!("failed to spawn detector thread: {err}")),
            ),
        };

        Self {
            request_tx: Some(request_tx),
            reply_rx,
            ready_rx,
            readiness,
            in_flight: false,
            latest: Vec::new(),
            handle,
        }
    }

    fn poll_readiness(&mut self) {
        if self.readiness != Readiness::Loading {
            return;
        }
        match self.ready_rx.try_recv() {
            Ok(Ok(())) => self.readiness = Readiness::Ready,
            Ok(Err(message)) => self.readiness = Readiness::Failed(message),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                self.readiness = Readiness::Failed("detector thread exited".to_string());
            }
        }
    }

    /// Blocks until initialization finishes or `timeout` elapses.
    pub fn wait_until_ready(&mut self, timeout: Duration) -> CaptureResult<()> {
        let deadline = Instant::now() + timeout;
        while self.readiness == Readiness::Loading {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.ready_rx.recv_timeout(remaining) {
                Ok(Ok(())) => self.readiness = Readiness::Ready,
                Ok(Err(message)) => self.readiness = Readiness::Failed(message),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    self.readiness = Readiness::Failed("detector thread exited".to_string());
                }
            }
        }
        self.ensure_ready()
    }

    /// Takes the worker's answer for the in-flight frame, if it has finished.
    fn collect_reply(&mut self) -> Option<DetectionReply> {
        if !self.in_flight {
            return None;
        }
        match self.reply_rx.try_recv() {
            Ok(reply) => {
                self.in_flight = false;
                Some(reply)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.in_flight = false;
                Some(Err(anyhow::anyhow!("detector worker stopped before replying")))
            }
        }
    }

    fn submit(&mut self, frame: &Frame) -> CaptureResult<()> {
        let Some(request_tx) = self.request_tx.as_ref() else {
            return Err(CaptureError::DetectorUnavailable(
                "detector has shut down".to_string(),
            ));
        };
        match request_tx.try_send(frame.clone()) {
            Ok(()) => {
                self.in_flight = true;
                Ok(())
            }
            Err(TrySendError::Full(_)) => Ok(()),
            Err(TrySendError::Disconnected(_)) => Err(CaptureError::TransientDetectionFailure(
                "detector worker is gone".to_string(),
            )),
        }
    }
}

impl FrameProcessor for DelegatedProcessor {
    fn ensure_ready(&mut self) -> CaptureResult<()> {
        self.poll_readiness();
        match &self.readiness {
            Readiness::Ready => Ok(()),
            Readiness::Loading => Err(CaptureError::ModelNotReady),
            Readiness::Failed(message) => Err(CaptureError::DetectorUnavailable(message.clone())),
        }
    }

    fn process(&mut self, frame: &Frame, _elapsed: Duration) -> CaptureResult<Vec<Hand>> {
        self.ensure_ready()?;

        let failure = match self.collect_reply() {
            Some(Ok(hands)) => {
                self.latest = hands;
                None
            }
            Some(Err(err)) => {
                self.latest.clear();
                Some(CaptureError::TransientDetectionFailure(format!("{err:#}")))
            }
            None => None,
        };

        if !self.in_flight {
            self.submit(frame)?;
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(self.latest.clone()),
        }
    }

    fn label(&self) -> &'static str {
        "detector"
    }
}

impl Drop for DelegatedProcessor {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop.
        self.request_tx.take();
        self.poll_readiness();
        let Some(handle) = self.handle.take() else {
            return;
        };
        if self.readiness == Readiness::Ready && !self.in_flight {
            let _ = handle.join();
        } else {
            // Initialization or a detection is still running; the thread exits on
            // its own once it sees the closed channel.
            log::debug!("detaching busy hand detector worker");
        }
    }
}

fn run_worker_loop<D: HandDetector>(
    mut detector: D,
    max_hands: usize,
    request_rx: Receiver<Frame>,
    reply_tx: Sender<DetectionReply>,
) {
    while let Ok(frame) = request_rx.recv() {
        let reply = detector.estimate(&frame).map(|mut hands| {
            hands.truncate(max_hands);
            hands
        });
        if let Err(err) = &reply {
            log::warn!("hand detection failed: {err:?}");
        }
        if reply_tx.send(reply).is_err() {
            break;
        }
    }
    log::debug!("hand detector worker stopped");
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;
    use crate::types::{Handedness, Landmark};

    struct ScriptedDetector {
        calls: usize,
        fail_on: Option<usize>,
        hands_per_frame: usize,
        gate: Option<Receiver<()>>,
    }

    impl ScriptedDetector {
        fn new(fail_on: Option<usize>, hands_per_frame: usize) -> Self {
            Self {
                calls: 0,
                fail_on,
                hands_per_frame,
                gate: None,
            }
        }
    }

    impl HandDetector for ScriptedDetector {
        fn estimate(&mut self, frame: &Frame) -> anyhow::Result<Vec<Hand>> {
            if let Some(gate) = &self.gate {
                let _ = gate.recv();
            }
            let call = self.calls;
            self.calls += 1;
            if Some(call) == self.fail_on {
                return Err(anyhow!("frame {call} rejected"));
            }
            Ok((0..self.hands_per_frame)
                .map(|_| Hand {
                    landmarks: vec![Landmark {
                        x: frame.width as f32 / 2.0,
                        y: frame.height as f32 / 2.0,
                        score: 0.9,
                        joint: 0,
                    }],
                    score: 0.9,
                    handedness: Handedness::Right,
                })
                .collect())
        }
    }

    fn ready(detector: ScriptedDetector) -> DelegatedProcessor {
        let mut processor =
            DelegatedProcessor::spawn(DetectorConfig::default(), move |_| Ok(detector));
        processor.wait_until_ready(Duration::from_secs(5)).unwrap();
        processor
    }

    /// Waits until the worker has answered the in-flight frame.
    fn await_reply(processor: &DelegatedProcessor) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while processor.in_flight && processor.reply_rx.is_empty() {
            assert!(Instant::now() < deadline, "worker never replied");
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Submits `frame` and returns the result of the tick that collects its reply.
    fn detect(processor: &mut DelegatedProcessor, frame: &Frame) -> CaptureResult<Vec<Hand>> {
        processor.process(frame, Duration::ZERO)?;
        await_reply(processor);
        processor.process(frame, Duration::ZERO)
    }

    #[test]
    fn reports_not_ready_until_initialized() {
        let (gate_tx, gate_rx) = bounded::<()>(1);
        let mut processor = DelegatedProcessor::spawn(DetectorConfig::default(), move |_| {
            let _ = gate_rx.recv();
            Ok(ScriptedDetector::new(None, 1))
        });
        let frame = Frame::solid(8, 8, [0, 0, 0, 255]);

        assert_eq!(processor.ensure_ready(), Err(CaptureError::ModelNotReady));
        assert_eq!(
            processor.process(&frame, Duration::ZERO),
            Err(CaptureError::ModelNotReady)
        );

        gate_tx.send(()).unwrap();
        processor.wait_until_ready(Duration::from_secs(5)).unwrap();
        assert_eq!(detect(&mut processor, &frame).unwrap().len(), 1);
    }

    #[test]
    fn failed_initialization_is_reported() {
        let mut processor = DelegatedProcessor::spawn(
            DetectorConfig::default(),
            |_| -> anyhow::Result<ScriptedDetector> { Err(anyhow!("model file missing")) },
        );
        let err = processor
            .wait_until_ready(Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, CaptureError::DetectorUnavailable(msg) if msg.contains("missing")));
    }

    #[test]
    fn detection_failure_is_transient() {
        let mut processor = ready(ScriptedDetector::new(Some(1), 1));
        let frame = Frame::solid(8, 8, [0, 0, 0, 255]);

        assert_eq!(detect(&mut processor, &frame).unwrap().len(), 1);
        await_reply(&processor);
        assert!(matches!(
            processor.process(&frame, Duration::ZERO),
            Err(CaptureError::TransientDetectionFailure(_))
        ));
        await_reply(&processor);
        assert_eq!(processor.process(&frame, Duration::ZERO).unwrap().len(), 1);
    }

    #[test]
    fn hands_are_capped_at_max() {
        let mut processor = ready(ScriptedDetector::new(None, 5));
        let frame = Frame::solid(8, 8, [0, 0, 0, 255]);
        assert_eq!(detect(&mut processor, &frame).unwrap().len(), 2);
    }

    #[test]
    fn slow_detection_does_not_block_the_caller() {
        let (gate_tx, gate_rx) = bounded::<()>(1);
        let mut detector = ScriptedDetector::new(None, 1);
        detector.gate = Some(gate_rx);
        let mut processor = ready(detector);
        let frame = Frame::solid(8, 8, [0, 0, 0, 255]);

        let started = Instant::now();
        for _ in 0..5 {
            assert_eq!(processor.process(&frame, Duration::ZERO).unwrap(), Vec::new());
        }
        assert!(started.elapsed() < Duration::from_millis(100));
        assert!(processor.in_flight);

        gate_tx.send(()).unwrap();
        await_reply(&processor);
        assert_eq!(processor.process(&frame, Duration::ZERO).unwrap().len(), 1);
        // The next frame went out with the collected reply; release it for teardown.
        gate_tx.send(()).unwrap();
    }

    #[test]
    fn drop_during_initialization_returns_promptly() {
        let (gate_tx, gate_rx) = bounded::<()>(1);
        let processor = DelegatedProcessor::spawn(DetectorConfig::default(), move |_| {
            let _ = gate_rx.recv_timeout(Duration::from_secs(3));
            Ok(ScriptedDetector::new(None, 1))
        });

        let started = Instant::now();
        drop(processor);
        assert!(started.elapsed() < Duration::from_millis(500));
        drop(gate_tx);
    }
}
