//! Encoded image representation shared by both acquisition paths.
//!
//! Images travel through the session as `data:<mime>;base64,<payload>` strings so
//! that consumers never need to know whether a picture came from the camera or
//! from an uploaded file.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{DynamicImage, RgbImage, codecs::jpeg::JpegEncoder};

use super::types::CaptureError;

/// JPEG quality used for every still the session produces (0.92).
pub const JPEG_QUALITY: u8 = 92;

/// MIME type of every image handed to the accept callback.
pub const JPEG_MIME: &str = "image/jpeg";

/// An immutable encoded image in data-URI form.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage(String);

impl EncodedImage {
    /// Wrap raw encoded bytes of the given MIME type.
    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Self {
        Self(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
    }

    /// Parse an existing data URI. Only base64 payloads are accepted.
    pub fn from_data_uri(uri: &str) -> Result<Self, CaptureError> {
        let (header, payload) = split_data_uri(uri).ok_or(CaptureError::DecodeFailed)?;
        if !header.ends_with(";base64") || STANDARD.decode(payload).is_err() {
            return Err(CaptureError::DecodeFailed);
        }
        Ok(Self(uri.to_string()))
    }

    pub fn as_data_uri(&self) -> &str {
        &self.0
    }

    pub fn into_data_uri(self) -> String {
        self.0
    }

    /// MIME type declared in the data-URI header.
    pub fn mime_type(&self) -> &str {
        split_data_uri(&self.0)
            .and_then(|(header, _)| header.split(';').next())
            .unwrap_or_default()
    }

    /// Encoded file bytes carried by this image.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CaptureError> {
        let (_, payload) = split_data_uri(&self.0).ok_or(CaptureError::DecodeFailed)?;
        STANDARD
            .decode(payload)
            .map_err(|_| CaptureError::DecodeFailed)
    }

    /// Decode to pixels.
    pub fn decode(&self) -> Result<DynamicImage, CaptureError> {
        decode_bytes(&self.to_bytes()?)
    }

    /// Pixel dimensions `(width, height)` after decoding.
    pub fn dimensions(&self) -> Result<(u32, u32), CaptureError> {
        let decoded = self.decode()?;
        Ok((decoded.width(), decoded.height()))
    }
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime", &self.mime_type())
            .field("len", &self.0.len())
            .finish()
    }
}

fn split_data_uri(uri: &str) -> Option<(&str, &str)> {
    uri.strip_prefix("data:")?.split_once(',')
}

/// Decode bytes as an image, mapping any failure to [`CaptureError::DecodeFailed`].
pub fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage, CaptureError> {
    image::load_from_memory(bytes).map_err(|e| {
        log::warn!("Image decode failed ({} bytes): {}", bytes.len(), e);
        CaptureError::DecodeFailed
    })
}

/// Validate that `bytes` decode as an image and wrap them with their detected MIME type.
///
/// The original bytes are kept as-is; nothing is re-encoded.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<EncodedImage, CaptureError> {
    let format = image::guess_format(bytes).map_err(|_| CaptureError::DecodeFailed)?;
    decode_bytes(bytes)?;
    Ok(EncodedImage::from_bytes(format.to_mime_type(), bytes))
}

/// Encode pixels as a JPEG still at [`JPEG_QUALITY`].
pub fn encode_jpeg(pixels: &RgbImage) -> Result<EncodedImage, CaptureError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY)
        .encode_image(pixels)
        .map_err(|e| {
            log::warn!(
                "JPEG encode of {}x{} failed: {}",
                pixels.width(),
                pixels.height(),
                e
            );
            CaptureError::RenderFailed
        })?;
    Ok(EncodedImage::from_bytes(JPEG_MIME, &buffer))
}
