//! Data types for the photo capture session.

use thiserror::Error;

use super::encoding::EncodedImage;

/// Visible mode of a capture session. Exactly one is active at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// No session, or the session has been closed.
    #[default]
    Idle,
    /// Live camera preview is shown and a frame can be captured.
    CameraActive,
    /// An uploaded file is being read and decoded.
    Loading,
    /// A captured or uploaded image is waiting to be accepted or retaken.
    Review,
    /// A failure is shown with a single recovery action.
    Error,
}

/// Camera permission as last observed from the camera source.
///
/// Informational only; it never gates a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraPermission {
    #[default]
    Unknown,
    Granted,
    Denied,
}

/// Snapshot of the session as a UI would render it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CaptureView {
    pub mode: CaptureMode,
    /// Image under review. Only set in [`CaptureMode::Review`].
    pub image: Option<EncodedImage>,
    /// Failure being shown. Only set in [`CaptureMode::Error`].
    pub error: Option<CaptureError>,
    pub permission: CameraPermission,
}

impl CaptureView {
    /// User-facing message of the current error, if any.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

/// Classified capture failures. The display text is the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("Camera access was denied. Please allow access when prompted.")]
    PermissionDenied,

    #[error("No camera found. Please ensure your device has a camera.")]
    DeviceNotFound,

    #[error("Camera is in use by another application.")]
    DeviceBusy,

    #[error("Camera API is not supported in this environment. Please try using HTTPS.")]
    ApiUnsupported,

    /// Unmapped device failure that still carried a message.
    #[error("Camera error: {0}")]
    CameraError(String),

    #[error("Failed to access camera. Please try again.")]
    GenericUnknown,

    #[error("Failed to capture image. Please try again.")]
    CaptureFailed,

    #[error("Failed to read the selected image.")]
    FileReadFailed,

    #[error("Failed to load the image. Please try again.")]
    DecodeFailed,

    #[error("Failed to process the image. Please try again.")]
    RenderFailed,
}

impl CaptureError {
    /// Whether the failure came from the camera device rather than from an image.
    pub fn is_device_failure(&self) -> bool {
        matches!(
            self,
            CaptureError::PermissionDenied
                | CaptureError::DeviceNotFound
                | CaptureError::DeviceBusy
                | CaptureError::ApiUnsupported
                | CaptureError::CameraError(_)
                | CaptureError::GenericUnknown
        )
    }
}

/// Errors returned by [`super::CaptureManager`] control methods.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Capture manager not running")]
    NotRunning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_message_includes_device_text() {
        let err = CaptureError::CameraError("sensor overheated".to_string());
        assert_eq!(err.to_string(), "Camera error: sensor overheated");
        assert!(err.is_device_failure());
    }

    #[test]
    fn image_failures_are_not_device_failures() {
        for err in [
            CaptureError::CaptureFailed,
            CaptureError::FileReadFailed,
            CaptureError::DecodeFailed,
            CaptureError::RenderFailed,
        ] {
            assert!(!err.is_device_failure(), "{err:?}");
        }
    }

    #[test]
    fn default_view_is_idle_and_empty() {
        let view = CaptureView::default();
        assert_eq!(view.mode, CaptureMode::Idle);
        assert!(view.image.is_none());
        assert!(view.error_message().is_none());
        assert_eq!(view.permission, CameraPermission::Unknown);
    }
}
