use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, CameraInfo, FrameFormat, RequestedFormat,
        RequestedFormatType, Resolution as CameraResolution,
    },
};

use super::{CameraSource, FacingMode, MediaStream, StreamConstraints, convert};
use crate::{
    error::{CaptureError, CaptureResult},
    types::{Frame, Resolution},
};

const PREFERRED_FPS: u32 = 30;

// Built-in macOS cameras often reject YUYV even though it is advertised.
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

fn requested_formats(constraints: &StreamConstraints) -> [RequestedFormat<'static>; 3] {
    let target = CameraFormat::new(
        CameraResolution::new(constraints.width, constraints.height),
        FrameFormat::MJPEG,
        PREFERRED_FPS,
    );
    [
        RequestedFormat::with_formats(RequestedFormatType::Closest(target), PREFERRED_PIXEL_FORMATS),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(target)),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: CameraIndex,
    pub label: String,
}

pub fn available_cameras() -> Result<Vec<CameraDevice>> {
    let cameras = query(ApiBackend::Auto)?;
    Ok(cameras
        .into_iter()
        .map(|info: CameraInfo| CameraDevice {
            index: info.index().clone(),
            label: info.human_name(),
        })
        .collect())
}

/// Native camera opened through nokhwa, one capture thread per stream.
#[derive(Clone, Debug, Default)]
pub struct NokhwaCamera {
    index: Option<u32>,
}

impl NokhwaCamera {
    pub fn new(index: Option<u32>) -> Self {
        Self { index }
    }

    fn pick_index(&self, facing: FacingMode) -> CaptureResult<CameraIndex> {
        if let Some(index) = self.index {
            return Ok(CameraIndex::Index(index));
        }

        let devices = available_cameras().map_err(|err| classify(&err))?;
        // nokhwa has no facing metadata; the first device is usually the built-in front camera.
        let device = match facing {
            FacingMode::User => devices.first(),
            FacingMode::Environment => devices.last(),
        };
        device
            .map(|d| {
                log::info!("using camera {} for {:?} facing", d.label, facing);
                d.index.clone()
            })
            .ok_or_else(|| CaptureError::DeviceUnavailable("no cameras detected".to_string()))
    }
}

impl CameraSource for NokhwaCamera {
    fn request_video_stream(
        &mut self,
        constraints: &StreamConstraints,
    ) -> CaptureResult<Box<dyn MediaStream>> {
        let index = self.pick_index(constraints.facing_mode)?;
        let stream = NokhwaStream::open(index, *constraints)?;
        Ok(Box::new(stream))
    }
}

fn build_camera(index: &CameraIndex, constraints: &StreamConstraints) -> Result<Camera> {
    let mut last_err = None;

    for requested in requested_formats(constraints) {
        match Camera::new(index.clone(), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => return Ok(camera),
                Err(err) => last_err = Some(err.into()),
            },
            Err(err) => last_err = Some(err.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
}

fn classify(err: &anyhow::Error) -> CaptureError {
    let text = format!("{err:#}");
    let lower = text.to_ascii_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        CaptureError::PermissionDenied
    } else {
        CaptureError::DeviceUnavailable(text)
    }
}

#[derive(Debug)]
struct NokhwaStream {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
    frame_rx: Receiver<Frame>,
    first_frame: Option<Frame>,
}

impl NokhwaStream {
    fn open(index: CameraIndex, constraints: StreamConstraints) -> CaptureResult<Self> {
        let (frame_tx, frame_rx) = bounded(1);
        let (open_tx, open_rx) = bounded::<Result<(), String>>(1);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = thread::Builder::new()
            .name("camera-capture".into())
            .spawn(move || {
                let mut camera = match build_camera(&index, &constraints) {
                    Ok(camera) => {
                        let _ = open_tx.send(Ok(()));
                        camera
                    }
                    Err(err) => {
                        log::error!("failed to open camera: {err:?}");
                        let _ = open_tx.send(Err(format!("{err:#}")));
                        return;
                    }
                };
                log::info!(
                    "camera stream open at {}x{}",
                    camera.resolution().width(),
                    camera.resolution().height()
                );

                while !stop_flag.load(Ordering::Relaxed) {
                    let read_start = Instant::now();
                    let buffer = match camera.frame() {
                        Ok(buffer) => buffer,
                        Err(err) => {
                            log::warn!(
                                "camera frame read failed (after {:?}): {err:?}",
                                read_start.elapsed()
                            );
                            continue;
                        }
                    };

                    match convert::frame_from_buffer(&buffer) {
                        // Drop when the render loop has not picked up the previous frame.
                        Ok(frame) => {
                            let _ = frame_tx.try_send(frame);
                        }
                        Err(err) => log::warn!("failed to decode camera frame: {err:?}"),
                    }
                }

                if let Err(err) = camera.stop_stream() {
                    log::warn!("failed to stop camera stream: {err:?}");
                }
            })
            .map_err(|err| {
                CaptureError::DeviceUnavailable(format!("failed to spawn capture thread: {err}"))
            })?;

        let mut stream = Self {
            stop,
            handle: Some(handle),
            frame_rx,
            first_frame: None,
        };

        match open_rx.recv() {
            Ok(Ok(())) => Ok(stream),
            Ok(Err(message)) => {
                stream.stop_tracks();
                Err(classify(&anyhow!(message)))
            }
            Err(_) => {
                stream.stop_tracks();
                Err(CaptureError::DeviceUnavailable(
                    "capture thread exited before opening the camera".to_string(),
                ))
            }
        }
    }
}

impl MediaStream for NokhwaStream {
    fn wait_for_metadata(&mut self, timeout: Duration) -> CaptureResult<Resolution> {
        if let Some(frame) = &self.first_frame {
            return Ok(frame.resolution());
        }
        match self.frame_rx.recv_timeout(timeout) {
            Ok(frame) => {
                let resolution = frame.resolution();
                self.first_frame = Some(frame);
                Ok(resolution)
            }
            Err(RecvTimeoutError::Timeout) => Err(CaptureError::PlaybackFailure(format!(
                "no frame within {timeout:?}"
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::PlaybackFailure(
                "capture thread stopped".to_string(),
            )),
        }
    }

    fn current_frame(&mut self) -> Option<Frame> {
        let mut latest = self.first_frame.take();
        while let Ok(newer) = self.frame_rx.try_recv() {
            latest = Some(newer);
        }
        latest
    }

    fn stop_tracks(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn is_live(&self) -> bool {
        self.handle.is_some() && !self.stop.load(Ordering::SeqCst)
    }
}

impl Drop for NokhwaStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}
