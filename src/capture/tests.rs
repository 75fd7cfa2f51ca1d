use std::{
    io,
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, RgbImage};
use tokio::{
    sync::Semaphore,
    time::{Duration, sleep, timeout},
};

use super::{
    classify::DeviceFailure,
    dependencies::{CameraDevice, CameraStream, CaptureDependencies, CaptureListener, ImageFileReader},
    encoding::{EncodedImage, JPEG_MIME},
    manager::{CaptureManager, CaptureSettings},
    policy::CropPolicy,
    sources::{FileSelection, VideoConstraints},
    types::{CameraPermission, CaptureError, CaptureMode, CaptureView, ManagerError},
};

#[derive(Clone, Default)]
struct CameraProbe {
    opens: Arc<Mutex<usize>>,
    grabs: Arc<Mutex<usize>>,
    releases: Arc<Mutex<usize>>,
}

impl CameraProbe {
    fn opens(&self) -> usize {
        *self.opens.lock().unwrap()
    }

    fn grabs(&self) -> usize {
        *self.grabs.lock().unwrap()
    }

    fn releases(&self) -> usize {
        *self.releases.lock().unwrap()
    }
}

#[derive(Clone)]
struct MockCamera {
    frame: DynamicImage,
    failure: Option<DeviceFailure>,
    gate: Option<Arc<Semaphore>>,
    probe: CameraProbe,
}

impl MockCamera {
    fn with_frame(width: u32, height: u32) -> Self {
        let frame: RgbImage = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 251) as u8, (y % 241) as u8, 90])
        });
        Self {
            frame: DynamicImage::ImageRgb8(frame),
            failure: None,
            gate: None,
            probe: CameraProbe::default(),
        }
    }

    fn failing(name: &str) -> Self {
        Self {
            failure: Some(DeviceFailure::new(name, "device said no")),
            ..Self::with_frame(4, 4)
        }
    }

    fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(gate.clone());
        (self, gate)
    }
}

#[async_trait]
impl CameraDevice for MockCamera {
    async fn open(
        &self,
        _constraints: &VideoConstraints,
    ) -> Result<Arc<dyn CameraStream>, DeviceFailure> {
        *self.probe.opens.lock().unwrap() += 1;
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        Ok(Arc::new(MockStream {
            frame: self.frame.clone(),
            probe: self.probe.clone(),
        }))
    }
}

struct MockStream {
    frame: DynamicImage,
    probe: CameraProbe,
}

#[async_trait]
impl CameraStream for MockStream {
    async fn grab_frame(&self) -> Option<DynamicImage> {
        *self.probe.grabs.lock().unwrap() += 1;
        Some(self.frame.clone())
    }

    fn release(&self) {
        *self.probe.releases.lock().unwrap() += 1;
    }
}

struct MockReader {
    result: Result<Vec<u8>, io::ErrorKind>,
}

impl ImageFileReader for MockReader {
    fn read(&self, _path: &Path) -> io::Result<Vec<u8>> {
        self.result.clone().map_err(io::Error::from)
    }
}

#[derive(Clone, Default)]
struct MockListener {
    accepted: Arc<Mutex<Vec<EncodedImage>>>,
    cancels: Arc<Mutex<usize>>,
}

impl MockListener {
    fn accepted(&self) -> Vec<EncodedImage> {
        self.accepted.lock().unwrap().clone()
    }

    fn cancels(&self) -> usize {
        *self.cancels.lock().unwrap()
    }
}

impl CaptureListener for MockListener {
    fn on_accept(&self, image: EncodedImage) {
        self.accepted.lock().unwrap().push(image);
    }

    fn on_cancel(&self) {
        *self.cancels.lock().unwrap() += 1;
    }
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img: RgbImage = ImageBuffer::from_pixel(width, height, Rgb([150, 30, 60]));
    let mut out = io::Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn manager_with(
    policy: CropPolicy,
    camera: MockCamera,
    reader: MockReader,
    listener: MockListener,
) -> CaptureManager {
    let settings = CaptureSettings {
        policy,
        ..CaptureSettings::default()
    };
    let deps = CaptureDependencies {
        camera: Arc::new(camera),
        reader: Arc::new(reader),
        listener: Arc::new(listener),
    };
    CaptureManager::with_dependencies(&tokio::runtime::Handle::current(), settings, deps)
}

fn png_reader() -> MockReader {
    MockReader {
        result: Ok(png_bytes(60, 40)),
    }
}

fn selection() -> FileSelection {
    FileSelection::from_path("/uploads/label.jpg").unwrap()
}

async fn wait_for(
    manager: &CaptureManager,
    what: &str,
    predicate: impl FnMut(&CaptureView) -> bool,
) -> CaptureView {
    timeout(Duration::from_secs(20), manager.wait_until(predicate))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .expect("manager running")
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn open_ready(manager: &CaptureManager) {
    manager.set_open(true).unwrap();
    wait_for(manager, "camera ready", |v| {
        v.mode == CaptureMode::CameraActive && v.permission == CameraPermission::Granted
    })
    .await;
}

#[tokio::test]
async fn camera_capture_of_full_hd_frame_reviews_1536_square() {
    let camera = MockCamera::with_frame(1920, 1080);
    let probe = camera.probe.clone();
    let listener = MockListener::default();
    let manager = manager_with(
        CropPolicy::label_guide(),
        camera,
        png_reader(),
        listener.clone(),
    );

    open_ready(&manager).await;
    manager.capture_frame().unwrap();
    let view = wait_for(&manager, "review", |v| v.mode == CaptureMode::Review).await;

    let image = view.image.expect("review holds an image");
    assert_eq!(image.mime_type(), JPEG_MIME);
    assert_eq!(image.dimensions().unwrap(), (1536, 1536));
    assert!(view.error.is_none());
    assert_eq!(probe.grabs(), 1);
    eventually("camera released on entering review", || probe.releases() == 1).await;

    manager.accept().unwrap();
    wait_for(&manager, "closed", |v| v.mode == CaptureMode::Idle).await;
    eventually("accept callback", || listener.accepted().len() == 1).await;
    assert_eq!(listener.accepted()[0], image);
    assert_eq!(listener.cancels(), 0);
}

#[tokio::test]
async fn corrupt_upload_shows_decode_error_without_touching_camera() {
    let camera = MockCamera::with_frame(64, 48);
    let probe = camera.probe.clone();
    let reader = MockReader {
        result: Ok(b"\xff\xd8\xff\xe0 truncated jpeg".to_vec()),
    };
    let manager = manager_with(
        CropPolicy::default(),
        camera,
        reader,
        MockListener::default(),
    );

    open_ready(&manager).await;
    manager.upload(selection()).unwrap();
    let view = wait_for(&manager, "error", |v| v.mode == CaptureMode::Error).await;

    assert_eq!(view.error, Some(CaptureError::DecodeFailed));
    assert_eq!(
        view.error_message().as_deref(),
        Some("Failed to load the image. Please try again.")
    );
    assert!(view.image.is_none());
    assert_eq!(probe.opens(), 1);
    assert_eq!(probe.grabs(), 0);
}

#[tokio::test]
async fn unreadable_upload_shows_read_error() {
    let reader = MockReader {
        result: Err(io::ErrorKind::PermissionDenied),
    };
    let manager = manager_with(
        CropPolicy::default(),
        MockCamera::with_frame(8, 8),
        reader,
        MockListener::default(),
    );

    manager.upload(selection()).unwrap();
    let view = wait_for(&manager, "error", |v| v.mode == CaptureMode::Error).await;
    assert_eq!(view.error, Some(CaptureError::FileReadFailed));
}

#[tokio::test]
async fn retake_discards_previous_image() {
    let camera = MockCamera::with_frame(320, 240);
    let probe = camera.probe.clone();
    let listener = MockListener::default();
    let manager = manager_with(
        CropPolicy::centered(),
        camera,
        png_reader(),
        listener.clone(),
    );

    open_ready(&manager).await;
    manager.capture_frame().unwrap();
    wait_for(&manager, "review", |v| v.mode == CaptureMode::Review).await;

    manager.retake().unwrap();
    let view = wait_for(&manager, "camera again", |v| {
        v.mode == CaptureMode::CameraActive
    })
    .await;
    assert!(view.image.is_none());

    manager.accept().unwrap();
    eventually("second camera lifetime", || probe.opens() == 2).await;
    sleep(Duration::from_millis(50)).await;
    assert!(listener.accepted().is_empty());
    assert_eq!(manager.view().mode, CaptureMode::CameraActive);
}

#[tokio::test]
async fn late_camera_error_after_cancel_is_ignored() {
    let (camera, gate) = MockCamera::failing("NotAllowedError").gated();
    let probe = camera.probe.clone();
    let listener = MockListener::default();
    let manager = manager_with(
        CropPolicy::default(),
        camera,
        png_reader(),
        listener.clone(),
    );

    manager.set_open(true).unwrap();
    eventually("camera open requested", || probe.opens() == 1).await;
    manager.cancel().unwrap();
    wait_for(&manager, "closed", |v| v.mode == CaptureMode::Idle).await;
    eventually("cancel callback", || listener.cancels() == 1).await;

    gate.add_permits(1);
    sleep(Duration::from_millis(100)).await;

    let view = manager.view();
    assert_eq!(view.mode, CaptureMode::Idle);
    assert!(view.error.is_none());
    assert_eq!(view.permission, CameraPermission::Unknown);
    assert_eq!(listener.cancels(), 1);
    assert!(listener.accepted().is_empty());
    assert_eq!(probe.opens(), 1, "camera must not reopen");
}

#[tokio::test]
async fn stream_opened_after_close_is_released() {
    let (camera, gate) = MockCamera::with_frame(16, 16).gated();
    let probe = camera.probe.clone();
    let manager = manager_with(
        CropPolicy::default(),
        camera,
        png_reader(),
        MockListener::default(),
    );

    manager.set_open(true).unwrap();
    eventually("camera open requested", || probe.opens() == 1).await;
    manager.set_open(false).unwrap();
    wait_for(&manager, "closed", |v| v.mode == CaptureMode::Idle).await;

    gate.add_permits(1);
    eventually("abandoned stream released", || probe.releases() == 1).await;
    assert_eq!(manager.view().permission, CameraPermission::Unknown);
}

#[tokio::test]
async fn device_failure_is_classified_and_retry_restarts_camera() {
    let camera = MockCamera::failing("TrackStartError");
    let probe = camera.probe.clone();
    let manager = manager_with(
        CropPolicy::default(),
        camera,
        png_reader(),
        MockListener::default(),
    );

    manager.set_open(true).unwrap();
    let view = wait_for(&manager, "error", |v| v.mode == CaptureMode::Error).await;
    assert_eq!(view.error, Some(CaptureError::DeviceBusy));
    assert_eq!(view.permission, CameraPermission::Denied);

    manager.retry().unwrap();
    eventually("camera restarted", || probe.opens() == 2).await;
    wait_for(&manager, "error again", |v| v.mode == CaptureMode::Error).await;
}

#[tokio::test]
async fn capture_before_stream_ready_fails() {
    let (camera, gate) = MockCamera::with_frame(16, 16).gated();
    let probe = camera.probe.clone();
    let manager = manager_with(
        CropPolicy::default(),
        camera,
        png_reader(),
        MockListener::default(),
    );

    manager.set_open(true).unwrap();
    eventually("camera open requested", || probe.opens() == 1).await;
    manager.capture_frame().unwrap();
    let view = wait_for(&manager, "error", |v| v.mode == CaptureMode::Error).await;
    assert_eq!(view.error, Some(CaptureError::CaptureFailed));

    // The lifetime was abandoned by the error, so its stream is released on arrival.
    gate.add_permits(1);
    eventually("stream released", || probe.releases() == 1).await;
}

#[tokio::test]
async fn lazy_policy_crops_only_on_accept() {
    let listener = MockListener::default();
    let manager = manager_with(
        CropPolicy::centered_offset(),
        MockCamera::with_frame(400, 300),
        png_reader(),
        listener.clone(),
    );

    open_ready(&manager).await;
    manager.capture_frame().unwrap();
    let view = wait_for(&manager, "review", |v| v.mode == CaptureMode::Review).await;
    let raw = view.image.expect("raw image");
    assert_eq!(raw.dimensions().unwrap(), (400, 300));

    manager.accept().unwrap();
    eventually("accept callback", || listener.accepted().len() == 1).await;
    let accepted = &listener.accepted()[0];
    assert_eq!(accepted.mime_type(), JPEG_MIME);
    assert_eq!(accepted.dimensions().unwrap(), (225, 225));
    assert_eq!(manager.view().mode, CaptureMode::Idle);
}

#[tokio::test]
async fn upload_only_session_never_starts_camera() {
    let camera = MockCamera::with_frame(8, 8);
    let probe = camera.probe.clone();
    let listener = MockListener::default();
    let manager = manager_with(
        CropPolicy::centered(),
        camera,
        png_reader(),
        listener.clone(),
    );

    manager.upload(selection()).unwrap();
    let view = wait_for(&manager, "review", |v| v.mode == CaptureMode::Review).await;
    assert_eq!(view.image.unwrap().dimensions().unwrap(), (30, 30));

    manager.accept().unwrap();
    eventually("accept callback", || listener.accepted().len() == 1).await;
    assert_eq!(probe.opens(), 0);
}

#[tokio::test]
async fn external_close_discards_review_without_callbacks() {
    let listener = MockListener::default();
    let manager = manager_with(
        CropPolicy::default(),
        MockCamera::with_frame(100, 200),
        png_reader(),
        listener.clone(),
    );

    open_ready(&manager).await;
    manager.capture_frame().unwrap();
    wait_for(&manager, "review", |v| v.mode == CaptureMode::Review).await;

    manager.set_open(false).unwrap();
    let view = wait_for(&manager, "closed", |v| v.mode == CaptureMode::Idle).await;
    assert!(view.image.is_none() && view.error.is_none());

    manager.cancel().unwrap();
    manager.set_open(false).unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(listener.cancels(), 0);
    assert!(listener.accepted().is_empty());
}

#[test]
fn requests_return_error_when_channel_closed() {
    let manager = CaptureManager::with_closed_channel_for_test();
    let err = manager
        .set_open(true)
        .expect_err("should fail when channel closed");
    assert!(
        matches!(err, ManagerError::NotRunning),
        "unexpected error variant: {err:?}"
    );
    assert!(manager.capture_frame().is_err());
    assert_eq!(manager.view().mode, CaptureMode::Idle);
}
