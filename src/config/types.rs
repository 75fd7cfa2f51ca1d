//! Configuration type definitions.

use crate::capture::{
    CropBase, CropPolicy, CropPreset, Facing, VideoConstraints, crop::DEFAULT_MAX_RENDER_SIDE,
    file::{DEFAULT_FILENAME_TEMPLATE, FileSaveConfig, expand_tilde},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Square-crop settings.
///
/// A preset supplies every crop parameter; the optional fields override single
/// parameters of that preset.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CropConfig {
    /// Named crop preset (label-guide, centered, centered-offset)
    #[serde(default = "default_preset")]
    pub preset: CropPreset,

    /// Side of the square as a fraction of the base dimension (valid range: 0.05 - 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fraction: Option<f64>,

    /// Vertical shift of the crop center as a fraction of the image height (valid range: -0.5 - 0.5)
    /// Negative values move the square up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical_offset: Option<f64>,

    /// Dimension the fraction applies to (width, min-dimension)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<CropBase>,

    /// Crop when the image is acquired (true) or when it is accepted (false)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_capture: Option<bool>,

    /// Largest square side in pixels the renderer will allocate (valid range: 256 - 16384)
    #[serde(default = "default_max_render_side")]
    pub max_render_side: u32,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            preset: default_preset(),
            fraction: None,
            vertical_offset: None,
            base: None,
            at_capture: None,
            max_render_side: default_max_render_side(),
        }
    }
}

impl CropConfig {
    /// Resolves the preset and its overrides into a crop policy.
    ///
    /// Overrides that still fail validation are dropped in favour of the bare preset.
    pub fn policy(&self) -> CropPolicy {
        let preset = self.preset.policy();
        CropPolicy::new(
            self.fraction.unwrap_or(preset.crop_fraction()),
            self.vertical_offset.unwrap_or(preset.vertical_offset()),
            self.base.unwrap_or(preset.base()),
            self.at_capture.unwrap_or(preset.crop_at_capture()),
        )
        .unwrap_or_else(|err| {
            log::warn!("Ignoring crop overrides: {}", err);
            preset
        })
    }
}

/// Camera device settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CameraConfig {
    /// Preferred camera (environment = rear, user = front)
    #[serde(default)]
    pub facing: Facing,

    /// Ideal frame width in pixels (valid range: 160 - 7680)
    #[serde(default = "default_ideal_width")]
    pub ideal_width: u32,

    /// Ideal frame height in pixels (valid range: 160 - 7680)
    #[serde(default = "default_ideal_height")]
    pub ideal_height: u32,

    /// Still-frame file that acts as the camera feed
    /// Leave unset when no camera is attached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_path: Option<PathBuf>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            facing: Facing::default(),
            ideal_width: default_ideal_width(),
            ideal_height: default_ideal_height(),
            device_path: None,
        }
    }
}

impl CameraConfig {
    pub fn constraints(&self) -> VideoConstraints {
        VideoConstraints {
            facing: self.facing,
            ideal_width: self.ideal_width,
            ideal_height: self.ideal_height,
        }
    }
}

/// Where accepted images are written by `--save`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OutputConfig {
    /// Directory for saved images (supports ~ for home directory)
    #[serde(default = "default_save_directory")]
    pub save_directory: String,

    /// Filename template with chrono format specifiers (e.g. %Y-%m-%d)
    #[serde(default = "default_filename_template")]
    pub filename_template: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            save_directory: default_save_directory(),
            filename_template: default_filename_template(),
        }
    }
}

impl OutputConfig {
    pub fn save_config(&self) -> FileSaveConfig {
        FileSaveConfig {
            save_directory: expand_tilde(&self.save_directory),
            filename_template: self.filename_template.clone(),
        }
    }
}

fn default_preset() -> CropPreset {
    CropPreset::LabelGuide
}

fn default_max_render_side() -> u32 {
    DEFAULT_MAX_RENDER_SIDE
}

fn default_ideal_width() -> u32 {
    1920
}

fn default_ideal_height() -> u32 {
    1080
}

fn default_save_directory() -> String {
    "~/Pictures/VinAI".to_string()
}

fn default_filename_template() -> String {
    DEFAULT_FILENAME_TEMPLATE.to_string()
}
