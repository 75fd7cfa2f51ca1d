//! Saving accepted images to disk.

use super::{encoding::EncodedImage, types::CaptureError};
use chrono::{
    Local,
    format::{Item, StrftimeItems},
};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while writing an accepted image.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("Failed to save image: {0}")]
    Io(#[from] std::io::Error),

    #[error("Accepted image could not be decoded: {0}")]
    Image(#[from] CaptureError),
}

/// Filename template used when none is configured or the configured one is invalid.
pub const DEFAULT_FILENAME_TEMPLATE: &str = "label_%Y-%m-%d_%H%M%S";

/// Configuration for file saving.
#[derive(Debug, Clone)]
pub struct FileSaveConfig {
    /// Directory to save images to.
    pub save_directory: PathBuf,
    /// Filename template (supports chrono format specifiers).
    pub filename_template: String,
}

impl Default for FileSaveConfig {
    fn default() -> Self {
        Self {
            save_directory: dirs::picture_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("VinAI"),
            filename_template: DEFAULT_FILENAME_TEMPLATE.to_string(),
        }
    }
}

/// Generate a filename based on the template and current time.
///
/// # Arguments
/// * `template` - Template string with chrono format specifiers
/// * `extension` - File extension (e.g., "jpg")
///
/// An invalid template falls back to [`DEFAULT_FILENAME_TEMPLATE`].
pub fn generate_filename(template: &str, extension: &str) -> String {
    let now = Local::now();
    let mut filename = String::new();
    if write!(filename, "{}", now.format(template)).is_err() {
        log::warn!(
            "Invalid filename template '{}', using '{}'",
            template,
            DEFAULT_FILENAME_TEMPLATE
        );
        filename = now.format(DEFAULT_FILENAME_TEMPLATE).to_string();
    }
    format!("{}.{}", filename, extension)
}

/// Whether every specifier in `template` is understood by chrono.
pub fn is_valid_template(template: &str) -> bool {
    StrftimeItems::new(template).all(|item| !matches!(item, Item::Error))
}

/// Ensure the save directory exists, creating it if necessary.
///
/// # Returns
/// The canonicalized path to the directory
pub fn ensure_directory_exists(directory: &Path) -> Result<PathBuf, SaveError> {
    if !directory.exists() {
        log::info!("Creating image directory: {}", directory.display());
        fs::create_dir_all(directory)?;
    }

    let canonical = directory
        .canonicalize()
        .unwrap_or_else(|_| directory.to_path_buf());

    Ok(canonical)
}

/// Write the encoded bytes of `image` to `path`, readable by the owner only.
pub fn write_image(image: &EncodedImage, path: &Path) -> Result<(), SaveError> {
    let bytes = image.to_bytes()?;

    log::info!("Saving image to: {} ({} bytes)", path.display(), bytes.len());
    fs::write(path, &bytes)?;

    #[cfg(unix)]
    {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, Permissions::from_mode(0o600))?;
    }

    Ok(())
}

/// Save an accepted image into the configured directory under a timestamped name.
///
/// # Returns
/// Path to the saved file
pub fn save_accepted(image: &EncodedImage, config: &FileSaveConfig) -> Result<PathBuf, SaveError> {
    let directory = ensure_directory_exists(&config.save_directory)?;
    let extension = match image.mime_type() {
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "jpg",
    };
    let file_path = directory.join(generate_filename(&config.filename_template, extension));

    write_image(image, &file_path)?;
    log::info!("Image saved successfully: {}", file_path.display());

    Ok(file_path)
}

/// Expand tilde (~) in path strings.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    PathBuf::from(path)
}
