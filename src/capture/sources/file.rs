//! File upload acquisition source.

use std::path::{Path, PathBuf};

use image::ImageFormat;

use crate::capture::{
    dependencies::ImageFileReader,
    encoding::{EncodedImage, validate_image_bytes},
    types::CaptureError,
};

/// A file the user picked for upload. Only image types can be selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSelection {
    path: PathBuf,
}

impl FileSelection {
    /// Select a file by path. Returns `None` for files that are not images,
    /// which a picker restricted to `image/*` would never offer.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        if ImageFormat::from_path(&path).is_err() {
            log::info!("Ignoring non-image selection: {}", path.display());
            return None;
        }
        Some(Self { path })
    }

    /// Select a file from a `file://` URI, as returned by desktop file choosers.
    ///
    /// Percent-encoded characters (spaces, non-ASCII) are decoded.
    pub fn from_uri(uri: &str) -> Result<Option<Self>, CaptureError> {
        let url = url::Url::parse(uri).map_err(|e| {
            log::warn!("Invalid file URI '{}': {}", uri, e);
            CaptureError::FileReadFailed
        })?;
        let path = url.to_file_path().map_err(|_| {
            log::warn!("Cannot convert URI to path: {}", uri);
            CaptureError::FileReadFailed
        })?;
        Ok(Self::from_path(path))
    }

    /// Select from either a plain path or a `file://` URI.
    pub fn parse(input: &str) -> Result<Option<Self>, CaptureError> {
        if input.starts_with("file://") {
            Self::from_uri(input)
        } else {
            Ok(Self::from_path(input))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read a selection fully and forward it only if it decodes as an image.
pub(crate) fn load_selection(
    reader: &dyn ImageFileReader,
    selection: &FileSelection,
) -> Result<EncodedImage, CaptureError> {
    log::debug!("Reading upload from: {}", selection.path().display());
    let bytes = reader.read(selection.path()).map_err(|e| {
        log::warn!(
            "Failed to read upload {}: {}",
            selection.path().display(),
            e
        );
        CaptureError::FileReadFailed
    })?;
    log::info!("Read {} bytes from upload", bytes.len());
    validate_image_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::dependencies::FsImageReader;
    use image::{ImageBuffer, Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn non_image_extensions_are_not_selectable() {
        assert!(FileSelection::from_path("/tmp/notes.txt").is_none());
        assert!(FileSelection::from_path("/tmp/no_extension").is_none());
        assert!(FileSelection::from_path("/tmp/label.JPG").is_some());
        assert!(FileSelection::from_path("/tmp/label.webp").is_some());
    }

    #[test]
    fn uri_selection_decodes_percent_encoding() {
        let selection = FileSelection::parse("file:///tmp/wine%20label.png")
            .unwrap()
            .expect("image selection");
        assert_eq!(selection.path(), Path::new("/tmp/wine label.png"));

        assert_eq!(
            FileSelection::parse("file://remote-host/label.png"),
            Err(CaptureError::FileReadFailed)
        );
        assert_eq!(
            FileSelection::from_uri("not a uri"),
            Err(CaptureError::FileReadFailed)
        );
    }

    #[test]
    fn loads_valid_upload_with_original_mime() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("label.png");
        let img: RgbImage = ImageBuffer::from_pixel(12, 6, Rgb([200, 10, 10]));
        img.save(&path).unwrap();

        let selection = FileSelection::from_path(&path).unwrap();
        let encoded = load_selection(&FsImageReader, &selection).unwrap();
        assert_eq!(encoded.mime_type(), "image/png");
        assert_eq!(encoded.dimensions().unwrap(), (12, 6));
    }

    #[test]
    fn read_and_decode_failures_are_distinct() {
        let temp = TempDir::new().unwrap();
        let missing = FileSelection::from_path(temp.path().join("missing.jpg")).unwrap();
        assert_eq!(
            load_selection(&FsImageReader, &missing),
            Err(CaptureError::FileReadFailed)
        );

        let corrupt_path = temp.path().join("corrupt.jpg");
        std::fs::write(&corrupt_path, b"\xff\xd8\xff garbage").unwrap();
        let corrupt = FileSelection::from_path(&corrupt_path).unwrap();
        assert_eq!(
            load_selection(&FsImageReader, &corrupt),
            Err(CaptureError::DecodeFailed)
        );
    }
}
