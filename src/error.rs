/// Failures surfaced by the capture controller and its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("hand model is still loading")]
    ModelNotReady,

    #[error("video playback failed: {0}")]
    PlaybackFailure(String),

    #[error("hand detection failed for this frame: {0}")]
    TransientDetectionFailure(String),

    #[error("hand detector failed to initialize: {0}")]
    DetectorUnavailable(String),
}

impl CaptureError {
    /// Text shown in the error banner.
    pub fn user_message(&self) -> String {
        match self {
            CaptureError::PermissionDenied => {
                "Camera access was denied. Allow camera access and press Start again.".to_string()
            }
            CaptureError::DeviceUnavailable(detail) => {
                format!("No usable camera was found ({detail}).")
            }
            CaptureError::ModelNotReady => {
                "The hand model is still loading. Try again in a moment.".to_string()
            }
            CaptureError::PlaybackFailure(detail) => {
                format!("The camera stream could not be played ({detail}).")
            }
            CaptureError::TransientDetectionFailure(detail) => {
                format!("Hand detection failed on a frame ({detail}).")
            }
            CaptureError::DetectorUnavailable(detail) => {
                format!("The hand model could not be loaded ({detail}).")
            }
        }
    }

    /// Errors that abort `start()` and put the controller into the error state.
    pub fn is_acquisition_failure(&self) -> bool {
        matches!(
            self,
            CaptureError::PermissionDenied
                | CaptureError::DeviceUnavailable(_)
                | CaptureError::PlaybackFailure(_)
        )
    }
}

pub type CaptureResult<T> = Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_message_mentions_denial() {
        assert!(CaptureError::PermissionDenied.user_message().contains("denied"));
    }

    #[test]
    fn only_camera_failures_abort_start() {
        assert!(CaptureError::PermissionDenied.is_acquisition_failure());
        assert!(CaptureError::DeviceUnavailable("none".into()).is_acquisition_failure());
        assert!(CaptureError::PlaybackFailure("stalled".into()).is_acquisition_failure());
        assert!(!CaptureError::ModelNotReady.is_acquisition_failure());
        assert!(!CaptureError::DetectorUnavailable("missing".into()).is_acquisition_failure());
        assert!(!CaptureError::TransientDetectionFailure("x".into()).is_acquisition_failure());
    }
}
