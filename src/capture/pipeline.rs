use std::sync::Arc;

use tokio::task;

use crate::capture::{
    crop::{crop_decoded, crop_to_square},
    dependencies::{CameraStream, ImageFileReader},
    encoding::{EncodedImage, encode_jpeg},
    policy::CropPolicy,
    sources::{FileSelection, file::load_selection},
    types::CaptureError,
};

/// Crop settings applied by the pipeline. `policy` is `None` when the image
/// should be forwarded uncropped.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CropJob {
    pub(crate) policy: Option<CropPolicy>,
    pub(crate) max_side: u32,
}

/// Snapshot one frame from `stream` and encode it as a JPEG still, cropping it
/// if requested.
pub(crate) async fn capture_still(
    stream: Option<Arc<dyn CameraStream>>,
    job: CropJob,
) -> Result<EncodedImage, CaptureError> {
    let stream = stream.ok_or_else(|| {
        log::warn!("Capture requested before the camera stream was ready");
        CaptureError::CaptureFailed
    })?;
    let frame = stream.grab_frame().await.ok_or_else(|| {
        log::warn!("Camera stream returned no frame");
        CaptureError::CaptureFailed
    })?;

    log::info!("Captured frame {}x{}", frame.width(), frame.height());

    task::spawn_blocking(move || match job.policy {
        Some(policy) => crop_decoded(&frame, &policy, job.max_side),
        None => encode_jpeg(&frame.to_rgb8()),
    })
    .await
    .map_err(|e| {
        log::error!("Still encode task failed: {}", e);
        CaptureError::RenderFailed
    })?
}

/// Read and validate an uploaded file, cropping it if requested.
pub(crate) async fn load_upload(
    reader: Arc<dyn ImageFileReader>,
    selection: FileSelection,
    job: CropJob,
) -> Result<EncodedImage, CaptureError> {
    let image = task::spawn_blocking(move || load_selection(reader.as_ref(), &selection))
        .await
        .map_err(|e| {
            log::error!("Upload reader task failed: {}", e);
            CaptureError::FileReadFailed
        })??;

    match job.policy {
        Some(policy) => crop_image(image, policy, job.max_side).await,
        None => Ok(image),
    }
}

/// Run the square crop on a blocking task.
pub(crate) async fn crop_image(
    image: EncodedImage,
    policy: CropPolicy,
    max_side: u32,
) -> Result<EncodedImage, CaptureError> {
    task::spawn_blocking(move || crop_to_square(&image, &policy, max_side))
        .await
        .map_err(|e| {
            log::error!("Crop task failed: {}", e);
            CaptureError::RenderFailed
        })?
}
