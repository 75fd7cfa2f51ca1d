//! Acquisition sources: the live camera and user-selected files.

pub mod camera;
pub mod file;

pub use camera::{Facing, NoCamera, StillFileCamera, VideoConstraints};
pub use file::FileSelection;
