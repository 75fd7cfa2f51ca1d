use std::{collections::HashMap, future::Future, sync::Arc};

use tokio::sync::{mpsc, watch};

use crate::capture::{
    classify::{DeviceFailure, classify},
    crop::DEFAULT_MAX_RENDER_SIDE,
    dependencies::{CameraStream, CaptureDependencies},
    machine::{CaptureMachine, Command, Event, Ticket},
    pipeline::{CropJob, capture_still, crop_image, load_upload},
    policy::CropPolicy,
    sources::{FileSelection, VideoConstraints},
    types::{CaptureView, ManagerError},
};

/// Settings fixed for the lifetime of a manager.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureSettings {
    pub policy: CropPolicy,
    pub constraints: VideoConstraints,
    /// Largest square side the crop renderer will allocate.
    pub max_render_side: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            policy: CropPolicy::default(),
            constraints: VideoConstraints::default(),
            max_render_side: DEFAULT_MAX_RENDER_SIDE,
        }
    }
}

enum Signal {
    Event(Event),
    CameraOpened(Ticket, Result<Arc<dyn CameraStream>, DeviceFailure>),
}

/// Handle to a running capture session driver.
///
/// All events are processed one at a time, in arrival order, by a single task
/// that owns the state machine and the camera stream handles. I/O runs on
/// separate tasks whose results are fed back as events.
#[derive(Clone)]
pub struct CaptureManager {
    signal_tx: mpsc::UnboundedSender<Signal>,
    view_rx: watch::Receiver<CaptureView>,
}

impl CaptureManager {
    /// Create a capture manager with default dependencies.
    ///
    /// # Arguments
    /// * `runtime_handle` - Tokio runtime handle for spawning async tasks
    /// * `settings` - Crop policy and camera constraints
    pub fn new(runtime_handle: &tokio::runtime::Handle, settings: CaptureSettings) -> Self {
        Self::with_dependencies(runtime_handle, settings, CaptureDependencies::default())
    }

    /// Create a capture manager with custom dependencies (useful for testing).
    pub fn with_dependencies(
        runtime_handle: &tokio::runtime::Handle,
        settings: CaptureSettings,
        dependencies: CaptureDependencies,
    ) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel::<Signal>();
        let (view_tx, view_rx) = watch::channel(CaptureView::default());

        let driver = Driver {
            machine: CaptureMachine::new(settings.policy),
            streams: HashMap::new(),
            settings,
            dependencies,
            signal_tx: signal_tx.downgrade(),
            view_tx,
        };
        runtime_handle.spawn(driver.run(signal_rx));

        Self { signal_tx, view_rx }
    }

    /// Drive the external open flag. Opening starts the camera, closing discards the session.
    pub fn set_open(&self, open: bool) -> Result<(), ManagerError> {
        self.send(Event::SetOpen(open))
    }

    pub fn capture_frame(&self) -> Result<(), ManagerError> {
        self.send(Event::CaptureFrame)
    }

    pub fn upload(&self, selection: FileSelection) -> Result<(), ManagerError> {
        self.send(Event::Upload(selection))
    }

    pub fn retake(&self) -> Result<(), ManagerError> {
        self.send(Event::Retake)
    }

    /// Recovery action from the error state: restart the camera.
    pub fn retry(&self) -> Result<(), ManagerError> {
        self.send(Event::Retry)
    }

    pub fn accept(&self) -> Result<(), ManagerError> {
        self.send(Event::Accept)
    }

    pub fn cancel(&self) -> Result<(), ManagerError> {
        self.send(Event::Cancel)
    }

    /// Current view of the session.
    pub fn view(&self) -> CaptureView {
        self.view_rx.borrow().clone()
    }

    /// Receiver notified on every processed event.
    pub fn subscribe(&self) -> watch::Receiver<CaptureView> {
        self.view_rx.clone()
    }

    /// Wait until the view satisfies `predicate`.
    pub async fn wait_until(
        &self,
        predicate: impl FnMut(&CaptureView) -> bool,
    ) -> Result<CaptureView, ManagerError> {
        let mut view_rx = self.view_rx.clone();
        let view = view_rx
            .wait_for(predicate)
            .await
            .map_err(|_| ManagerError::NotRunning)?
            .clone();
        Ok(view)
    }

    fn send(&self, event: Event) -> Result<(), ManagerError> {
        self.signal_tx
            .send(Signal::Event(event))
            .map_err(|_| ManagerError::NotRunning)
    }
}

struct Driver {
    machine: CaptureMachine,
    streams: HashMap<Ticket, Arc<dyn CameraStream>>,
    settings: CaptureSettings,
    dependencies: CaptureDependencies,
    signal_tx: mpsc::WeakUnboundedSender<Signal>,
    view_tx: watch::Sender<CaptureView>,
}

impl Driver {
    async fn run(mut self, mut signal_rx: mpsc::UnboundedReceiver<Signal>) {
        while let Some(signal) = signal_rx.recv().await {
            let Some(event) = self.admit(signal) else {
                continue;
            };
            let commands = self.machine.handle(event);
            self.view_tx.send_replace(self.machine.view());
            for command in commands {
                self.execute(command);
            }
        }

        for (_, stream) in self.streams.drain() {
            stream.release();
        }
        log::debug!("Capture manager stopped");
    }

    fn admit(&mut self, signal: Signal) -> Option<Event> {
        match signal {
            Signal::Event(event) => Some(event),
            Signal::CameraOpened(ticket, Ok(stream)) => {
                if self.machine.is_live_camera(ticket) {
                    self.streams.insert(ticket, stream);
                    Some(Event::CameraReady(ticket))
                } else {
                    log::debug!("Releasing stream of an abandoned camera lifetime");
                    stream.release();
                    None
                }
            }
            Signal::CameraOpened(ticket, Err(failure)) => {
                log::warn!("Camera device failure: {}", failure);
                Some(Event::CameraFailed(ticket, classify(&failure)))
            }
        }
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::StartCamera(ticket) => {
                let camera = Arc::clone(&self.dependencies.camera);
                let constraints = self.settings.constraints;
                self.spawn(async move {
                    Signal::CameraOpened(ticket, camera.open(&constraints).await)
                });
            }
            Command::StopCamera(ticket) => {
                if let Some(stream) = self.streams.remove(&ticket) {
                    stream.release();
                }
            }
            Command::Snapshot {
                ticket,
                camera,
                crop,
            } => {
                let stream = self.streams.get(&camera).cloned();
                let job = self.crop_job(crop);
                self.spawn(async move {
                    let result = capture_still(stream, job).await;
                    Signal::Event(Event::FrameCaptured(ticket, result))
                });
            }
            Command::ReadFile {
                ticket,
                selection,
                crop,
            } => {
                let reader = Arc::clone(&self.dependencies.reader);
                let job = self.crop_job(crop);
                self.spawn(async move {
                    let result = load_upload(reader, selection, job).await;
                    Signal::Event(Event::FileLoaded(ticket, result))
                });
            }
            Command::CropForAccept { ticket, image } => {
                let policy = self.settings.policy;
                let max_side = self.settings.max_render_side;
                self.spawn(async move {
                    let result = crop_image(image, policy, max_side).await;
                    Signal::Event(Event::AcceptCropped(ticket, result))
                });
            }
            Command::DeliverAccept(image) => self.dependencies.listener.on_accept(image),
            Command::DeliverCancel => self.dependencies.listener.on_cancel(),
        }
    }

    fn crop_job(&self, crop: bool) -> CropJob {
        CropJob {
            policy: crop.then_some(self.settings.policy),
            max_side: self.settings.max_render_side,
        }
    }

    fn spawn<F>(&self, work: F)
    where
        F: Future<Output = Signal> + Send + 'static,
    {
        let Some(signal_tx) = self.signal_tx.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(mpsc::error::SendError(Signal::CameraOpened(_, Ok(stream)))) =
                signal_tx.send(work.await)
            {
                stream.release();
            }
        });
    }
}

#[cfg(test)]
impl CaptureManager {
    pub(crate) fn with_closed_channel_for_test() -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel::<Signal>();
        drop(signal_rx);
        let (_view_tx, view_rx) = watch::channel(CaptureView::default());
        Self { signal_tx, view_rx }
    }
}
