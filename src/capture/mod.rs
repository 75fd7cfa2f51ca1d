//! Photo capture and square-crop subsystem.
//!
//! This module turns a live camera feed or an uploaded file into a normalized,
//! square-cropped JPEG:
//! - Capture session state machine with liveness-checked async results
//! - Camera and file acquisition sources
//! - Square-crop transform driven by a fixed crop policy
//! - Classification of camera device failures
//! - Saving accepted images to disk

pub mod classify;
pub mod crop;
pub mod encoding;
pub mod file;
pub mod machine;
pub mod policy;
pub mod sources;
pub mod types;

mod dependencies;
mod manager;
mod pipeline;
#[cfg(test)]
mod tests;

pub use dependencies::{
    CameraDevice, CameraStream, CaptureDependencies, CaptureListener, FsImageReader,
    ImageFileReader,
};
pub use encoding::EncodedImage;
pub use manager::{CaptureManager, CaptureSettings};
pub use policy::{CropBase, CropPolicy, CropPreset};
pub use sources::{Facing, FileSelection, VideoConstraints};
pub use types::{CameraPermission, CaptureError, CaptureMode, CaptureView, ManagerError};
