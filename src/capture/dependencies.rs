use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use image::DynamicImage;

use crate::capture::{
    classify::DeviceFailure,
    encoding::EncodedImage,
    sources::camera::{NoCamera, StillFileCamera, VideoConstraints},
};

/// A camera that can start a video stream.
///
/// Each successful `open` starts one stream lifetime: the returned stream is the
/// stream-ready signal, an error is the stream-error signal.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn open(
        &self,
        constraints: &VideoConstraints,
    ) -> Result<Arc<dyn CameraStream>, DeviceFailure>;
}

/// A running camera stream holding the device handle.
#[async_trait]
pub trait CameraStream: Send + Sync {
    /// Current frame, or `None` when the stream has no frame to give.
    async fn grab_frame(&self) -> Option<DynamicImage>;

    /// Release the device handle. Called exactly once per stream.
    fn release(&self);
}

/// Abstraction over reading user-selected files.
pub trait ImageFileReader: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Outcome callbacks of a capture session.
pub trait CaptureListener: Send + Sync {
    /// Called once per accepted session with a JPEG data URI.
    fn on_accept(&self, image: EncodedImage);

    /// Called once when the user aborts an open session.
    fn on_cancel(&self);
}

/// Bundle of dependencies used by the capture manager. Each component can be mocked in tests.
#[derive(Clone)]
pub struct CaptureDependencies {
    pub camera: Arc<dyn CameraDevice>,
    pub reader: Arc<dyn ImageFileReader>,
    pub listener: Arc<dyn CaptureListener>,
}

impl Default for CaptureDependencies {
    fn default() -> Self {
        Self {
            camera: Arc::new(NoCamera),
            reader: Arc::new(FsImageReader),
            listener: Arc::new(LoggingListener),
        }
    }
}

impl CaptureDependencies {
    /// Default dependencies with the given listener and, if set, a still-file camera.
    pub fn for_device(device_path: Option<PathBuf>, listener: Arc<dyn CaptureListener>) -> Self {
        let camera: Arc<dyn CameraDevice> = match device_path {
            Some(path) => Arc::new(StillFileCamera::new(path)),
            None => Arc::new(NoCamera),
        };
        Self {
            camera,
            listener,
            ..Self::default()
        }
    }
}

pub struct FsImageReader;
struct LoggingListener;

impl ImageFileReader for FsImageReader {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }
}

impl CaptureListener for LoggingListener {
    fn on_accept(&self, image: EncodedImage) {
        log::info!("Image accepted: {:?}", image);
    }

    fn on_cancel(&self) {
        log::info!("Capture cancelled");
    }
}
