//! Square-crop transform.

use std::borrow::Cow;

use image::{DynamicImage, GenericImageView, RgbImage, imageops, imageops::FilterType};

use super::{
    encoding::{EncodedImage, encode_jpeg},
    policy::{CropPolicy, CropRegion},
    types::CaptureError,
};

/// Default upper bound on the side of the rendered square. Crops that would be
/// larger are taken from a proportionally downscaled frame.
pub const DEFAULT_MAX_RENDER_SIDE: u32 = 8192;

/// Crop an encoded image to a square according to `policy` and re-encode it as JPEG.
///
/// Fails with [`CaptureError::DecodeFailed`] when the input cannot be decoded and
/// with [`CaptureError::RenderFailed`] when the square cannot be rendered or encoded.
pub fn crop_to_square(
    image: &EncodedImage,
    policy: &CropPolicy,
    max_side: u32,
) -> Result<EncodedImage, CaptureError> {
    let decoded = image.decode()?;
    crop_decoded(&decoded, policy, max_side)
}

/// Same as [`crop_to_square`] for an already decoded frame.
pub fn crop_decoded(
    decoded: &DynamicImage,
    policy: &CropPolicy,
    max_side: u32,
) -> Result<EncodedImage, CaptureError> {
    let mut frame = Cow::Borrowed(decoded);
    let mut region = region_of(&frame, policy)?;

    if region.size > max_side {
        let scale = f64::from(max_side) / f64::from(region.size);
        let scaled = |side: u32| ((f64::from(side) * scale).floor() as u32).max(1);
        let (width, height) = (scaled(frame.width()), scaled(frame.height()));
        log::info!(
            "Downscaling {}x{} to {}x{} for a {}px render limit",
            frame.width(),
            frame.height(),
            width,
            height,
            max_side
        );
        frame = Cow::Owned(decoded.resize_exact(width, height, FilterType::Triangle));
        region = region_of(&frame, policy)?;
    }

    log::debug!(
        "Cropping {}x{} to {}px square at ({}, {})",
        frame.width(),
        frame.height(),
        region.size,
        region.x,
        region.y
    );
    let square = render_square(&frame.to_rgb8(), region, max_side)?;
    encode_jpeg(&square)
}

fn region_of(frame: &DynamicImage, policy: &CropPolicy) -> Result<CropRegion, CaptureError> {
    let (width, height) = frame.dimensions();
    policy
        .region(width, height)
        .ok_or(CaptureError::DecodeFailed)
}

/// Copy `region` of `source` onto a black square canvas of side `region.size`.
///
/// Parts of the region outside the source stay black.
pub fn render_square(
    source: &RgbImage,
    region: CropRegion,
    max_side: u32,
) -> Result<RgbImage, CaptureError> {
    if region.size == 0 || region.size > max_side {
        log::warn!(
            "Refusing to render {}px square (limit {}px)",
            region.size,
            max_side
        );
        return Err(CaptureError::RenderFailed);
    }

    let mut canvas = RgbImage::new(region.size, region.size);
    let size = i64::from(region.size);
    let left = region.x.max(0);
    let top = region.y.max(0);
    let right = (region.x + size).min(i64::from(source.width()));
    let bottom = (region.y + size).min(i64::from(source.height()));

    if right > left && bottom > top {
        let visible = imageops::crop_imm(
            source,
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        )
        .to_image();
        imageops::replace(&mut canvas, &visible, left - region.x, top - region.y);
    }

    Ok(canvas)
}
