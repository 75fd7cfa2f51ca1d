//! Crop policy and square-crop geometry.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Image dimension the crop fraction is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum CropBase {
    /// Fraction of the image width.
    Width,
    /// Fraction of the shorter image side.
    MinDimension,
}

/// Named crop policies matching the guides shown over the camera preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum CropPreset {
    /// 80% of the width, centered at 44% of the height, cropped on capture.
    LabelGuide,
    /// 75% of the short side, centered, cropped on capture.
    Centered,
    /// 75% of the short side, centered at 44% of the height, cropped on accept.
    CenteredOffset,
}

impl CropPreset {
    pub fn policy(self) -> CropPolicy {
        match self {
            CropPreset::LabelGuide => CropPolicy::label_guide(),
            CropPreset::Centered => CropPolicy::centered(),
            CropPreset::CenteredOffset => CropPolicy::centered_offset(),
        }
    }
}

impl FromStr for CropPreset {
    type Err = PolicyError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "label-guide" => Ok(CropPreset::LabelGuide),
            "centered" => Ok(CropPreset::Centered),
            "centered-offset" => Ok(CropPreset::CenteredOffset),
            _ => Err(PolicyError::UnknownPreset(name.to_string())),
        }
    }
}

/// Rejected policy values.
#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("crop fraction must be within (0, 1], got {0}")]
    Fraction(f64),
    #[error("vertical offset must be within [-0.5, 0.5], got {0}")]
    Offset(f64),
    #[error("unknown crop preset '{0}' (expected label-guide, centered or centered-offset)")]
    UnknownPreset(String),
}

/// Geometric parameters of the square crop, fixed for the lifetime of a manager.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropPolicy {
    crop_fraction: f64,
    vertical_offset: f64,
    base: CropBase,
    crop_at_capture: bool,
}

impl CropPolicy {
    pub fn new(
        crop_fraction: f64,
        vertical_offset: f64,
        base: CropBase,
        crop_at_capture: bool,
    ) -> Result<Self, PolicyError> {
        if !crop_fraction.is_finite() || crop_fraction <= 0.0 || crop_fraction > 1.0 {
            return Err(PolicyError::Fraction(crop_fraction));
        }
        if !vertical_offset.is_finite() || !(-0.5..=0.5).contains(&vertical_offset) {
            return Err(PolicyError::Offset(vertical_offset));
        }
        Ok(Self {
            crop_fraction,
            vertical_offset,
            base,
            crop_at_capture,
        })
    }

    pub const fn label_guide() -> Self {
        Self {
            crop_fraction: 0.8,
            vertical_offset: -0.06,
            base: CropBase::Width,
            crop_at_capture: true,
        }
    }

    pub const fn centered() -> Self {
        Self {
            crop_fraction: 0.75,
            vertical_offset: 0.0,
            base: CropBase::MinDimension,
            crop_at_capture: true,
        }
    }

    pub const fn centered_offset() -> Self {
        Self {
            crop_fraction: 0.75,
            vertical_offset: -0.06,
            base: CropBase::MinDimension,
            crop_at_capture: false,
        }
    }

    pub fn crop_fraction(&self) -> f64 {
        self.crop_fraction
    }

    pub fn vertical_offset(&self) -> f64 {
        self.vertical_offset
    }

    pub fn base(&self) -> CropBase {
        self.base
    }

    /// Crop when the image is produced (`true`) or only when it is accepted.
    pub fn crop_at_capture(&self) -> bool {
        self.crop_at_capture
    }

    /// Square region to cut from a `width` x `height` image.
    ///
    /// Returns `None` for an empty image.
    pub fn region(&self, width: u32, height: u32) -> Option<CropRegion> {
        if width == 0 || height == 0 {
            return None;
        }
        let base = match self.base {
            CropBase::Width => width,
            CropBase::MinDimension => width.min(height),
        };
        let size = ((self.crop_fraction * f64::from(base)).floor() as u32).max(1);
        let center_x = f64::from(width) / 2.0;
        let center_y = f64::from(height) * (0.5 + self.vertical_offset);

        Some(CropRegion {
            x: axis_origin(center_x, size, width),
            y: axis_origin(center_y, size, height),
            size,
        })
    }
}

impl Default for CropPolicy {
    fn default() -> Self {
        Self::label_guide()
    }
}

// Squares that fit stay inside the extent; larger ones keep covering all of it.
fn axis_origin(center: f64, size: u32, extent: u32) -> i64 {
    let origin = (center - f64::from(size) / 2.0).floor() as i64;
    let slack = i64::from(extent) - i64::from(size);
    if slack >= 0 {
        origin.clamp(0, slack)
    } else {
        origin.clamp(slack, 0)
    }
}

/// Square source region in image coordinates. The origin may be negative when
/// the square is larger than the image on that axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: i64,
    pub y: i64,
    pub size: u32,
}

impl CropRegion {
    /// Whether the whole square lies inside a `width` x `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        let end = |origin: i64| origin + i64::from(self.size);
        self.x >= 0
            && self.y >= 0
            && end(self.x) <= i64::from(width)
            && end(self.y) <= i64::from(height)
    }
}
