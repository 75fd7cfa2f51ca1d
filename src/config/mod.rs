//! Configuration file support for vinai-capture.
//!
//! This module handles loading and validating user settings from the configuration file
//! located at `~/.config/vinai-capture/config.toml`. Settings cover the crop policy,
//! the camera device and where accepted images are saved.
//!
//! If no config file exists, sensible defaults are used automatically.

pub mod types;

pub use types::{CameraConfig, CropConfig, OutputConfig};

use crate::capture::{
    CaptureSettings,
    file::{DEFAULT_FILENAME_TEMPLATE, is_valid_template},
};
use anyhow::{Context, Result};
use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure containing all user settings.
///
/// All fields have sensible defaults and will use those if not specified in the config file.
///
/// # Example TOML
/// ```toml
/// [crop]
/// preset = "label-guide"
///
/// [camera]
/// facing = "environment"
/// device_path = "/run/vinai/frame.jpg"
///
/// [output]
/// save_directory = "~/Pictures/VinAI"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, JsonSchema)]
pub struct Config {
    /// Square-crop policy
    #[serde(default)]
    pub crop: CropConfig,

    /// Camera device and stream constraints
    #[serde(default)]
    pub camera: CameraConfig,

    /// Saving accepted images
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Validates and clamps all configuration values to acceptable ranges.
    ///
    /// Invalid values are clamped to the nearest valid value and a warning is logged.
    ///
    /// Validated ranges:
    /// - `crop.fraction`: 0.05 - 1.0
    /// - `crop.vertical_offset`: -0.5 - 0.5
    /// - `crop.max_render_side`: 256 - 16384
    /// - `camera.ideal_width`, `camera.ideal_height`: 160 - 7680
    fn validate_and_clamp(&mut self) {
        if let Some(fraction) = self.crop.fraction {
            if !fraction.is_finite() {
                log::warn!("Invalid crop fraction {}, using preset value", fraction);
                self.crop.fraction = None;
            } else if !(0.05..=1.0).contains(&fraction) {
                log::warn!(
                    "Invalid crop fraction {:.2}, clamping to 0.05-1.0 range",
                    fraction
                );
                self.crop.fraction = Some(fraction.clamp(0.05, 1.0));
            }
        }

        if let Some(offset) = self.crop.vertical_offset {
            if !offset.is_finite() {
                log::warn!("Invalid vertical_offset {}, using preset value", offset);
                self.crop.vertical_offset = None;
            } else if !(-0.5..=0.5).contains(&offset) {
                log::warn!(
                    "Invalid vertical_offset {:.2}, clamping to -0.5-0.5 range",
                    offset
                );
                self.crop.vertical_offset = Some(offset.clamp(-0.5, 0.5));
            }
        }

        if !(256..=16384).contains(&self.crop.max_render_side) {
            log::warn!(
                "Invalid max_render_side {}, clamping to 256-16384 range",
                self.crop.max_render_side
            );
            self.crop.max_render_side = self.crop.max_render_side.clamp(256, 16384);
        }

        if !(160..=7680).contains(&self.camera.ideal_width) {
            log::warn!(
                "Invalid ideal_width {}, clamping to 160-7680 range",
                self.camera.ideal_width
            );
            self.camera.ideal_width = self.camera.ideal_width.clamp(160, 7680);
        }

        if !(160..=7680).contains(&self.camera.ideal_height) {
            log::warn!(
                "Invalid ideal_height {}, clamping to 160-7680 range",
                self.camera.ideal_height
            );
            self.camera.ideal_height = self.camera.ideal_height.clamp(160, 7680);
        }

        if self.output.filename_template.trim().is_empty() {
            log::warn!("Empty filename_template, falling back to default");
            self.output.filename_template = DEFAULT_FILENAME_TEMPLATE.to_string();
        } else if !is_valid_template(&self.output.filename_template) {
            log::warn!(
                "Invalid filename_template '{}', falling back to '{}'",
                self.output.filename_template,
                DEFAULT_FILENAME_TEMPLATE
            );
            self.output.filename_template = DEFAULT_FILENAME_TEMPLATE.to_string();
        }
    }

    /// Settings for a [`crate::capture::CaptureManager`] built from this config.
    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            policy: self.crop.policy(),
            constraints: self.camera.constraints(),
            max_render_side: self.crop.max_render_side,
        }
    }

    /// Returns the path to the configuration file.
    ///
    /// The config file is located at `~/.config/vinai-capture/config.toml`.
    ///
    /// # Errors
    /// Returns an error if the config directory cannot be determined (e.g., HOME not set).
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("vinai-capture");

        Ok(config_dir.join("config.toml"))
    }

    /// Loads configuration from the default location, or returns defaults if not found.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The config directory path cannot be determined
    /// - The file exists but cannot be read
    /// - The file exists but contains invalid TOML syntax
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            info!("Config file not found, using defaults");
            debug!("Expected config at: {}", config_path.display());
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Loads configuration from an explicit path. The file must exist.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config from {}", config_path.display()))?;

        config.validate_and_clamp();

        info!("Loaded config from {}", config_path.display());
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// JSON schema describing the configuration file.
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(Config)
    }
}
