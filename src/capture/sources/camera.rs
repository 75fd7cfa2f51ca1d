//! Camera acquisition source.

use std::{
    fs, io,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use image::{DynamicImage, imageops::FilterType};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::capture::{
    classify::DeviceFailure,
    dependencies::{CameraDevice, CameraStream},
};

/// Which camera to prefer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Facing {
    /// Rear-facing camera.
    #[default]
    Environment,
    /// Front-facing camera.
    User,
}

/// Stream constraints requested on every activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConstraints {
    pub facing: Facing,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            facing: Facing::Environment,
            ideal_width: 1920,
            ideal_height: 1080,
        }
    }
}

impl VideoConstraints {
    /// Size a `width` x `height` frame should be scaled to, or `None` when it
    /// already fits the ideal box. Aspect ratio is preserved.
    pub fn fit(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        if width <= self.ideal_width && height <= self.ideal_height {
            return None;
        }
        let scale = (f64::from(self.ideal_width) / f64::from(width))
            .min(f64::from(self.ideal_height) / f64::from(height));
        let scaled = |side: u32| ((f64::from(side) * scale).round() as u32).max(1);
        Some((scaled(width), scaled(height)))
    }
}

/// Camera used when no device is configured.
pub struct NoCamera;

#[async_trait]
impl CameraDevice for NoCamera {
    async fn open(
        &self,
        _constraints: &VideoConstraints,
    ) -> Result<Arc<dyn CameraStream>, DeviceFailure> {
        Err(DeviceFailure::new(
            "NotFoundError",
            "no camera device configured",
        ))
    }
}

/// Camera fed by a still-frame file that another process keeps up to date.
pub struct StillFileCamera {
    path: PathBuf,
}

impl StillFileCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CameraDevice for StillFileCamera {
    async fn open(
        &self,
        constraints: &VideoConstraints,
    ) -> Result<Arc<dyn CameraStream>, DeviceFailure> {
        log::debug!(
            "Opening still-frame camera {} ({:?}, ideal {}x{})",
            self.path.display(),
            constraints.facing,
            constraints.ideal_width,
            constraints.ideal_height
        );

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || fs::File::open(&path).map(|_| ()))
            .await
            .map_err(|e| DeviceFailure::new("AbortError", e.to_string()))?
            .map_err(|e| failure_from_io(&e))?;

        Ok(Arc::new(StillFileStream {
            path: self.path.clone(),
            constraints: *constraints,
            released: AtomicBool::new(false),
        }))
    }
}

struct StillFileStream {
    path: PathBuf,
    constraints: VideoConstraints,
    released: AtomicBool,
}

#[async_trait]
impl CameraStream for StillFileStream {
    async fn grab_frame(&self) -> Option<DynamicImage> {
        if self.released.load(Ordering::Acquire) {
            return None;
        }
        let path = self.path.clone();
        let constraints = self.constraints;
        let frame = tokio::task::spawn_blocking(move || {
            let frame = image::open(&path)
                .map_err(|e| log::warn!("Failed to read frame from {}: {}", path.display(), e))
                .ok()?;
            Some(match constraints.fit(frame.width(), frame.height()) {
                Some((width, height)) => frame.resize(width, height, FilterType::Triangle),
                None => frame,
            })
        })
        .await;

        match frame {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Frame grab task failed: {}", e);
                None
            }
        }
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            log::debug!("Released still-frame camera {}", self.path.display());
        }
    }
}

/// Map an I/O failure opening a device to the identifier a camera stack would report.
pub(crate) fn failure_from_io(err: &io::Error) -> DeviceFailure {
    let name = match err.kind() {
        io::ErrorKind::NotFound => "NotFoundError",
        io::ErrorKind::PermissionDenied => "NotAllowedError",
        io::ErrorKind::ResourceBusy => "NotReadableError",
        io::ErrorKind::Unsupported => "NotSupportedError",
        _ => "Error",
    };
    DeviceFailure::new(name, err.to_string())
}
