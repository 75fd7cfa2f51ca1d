//! Capture session state machine.
//!
//! The machine is synchronous and performs no I/O: every input is an [`Event`],
//! every side effect is a [`Command`] returned to the driver. Asynchronous results
//! come back as events tagged with the [`Ticket`] they were issued under; a result
//! whose ticket is no longer current (closed session, abandoned camera lifetime,
//! superseded request) is dropped.

use super::{
    encoding::EncodedImage,
    policy::CropPolicy,
    sources::FileSelection,
    types::{CameraPermission, CaptureError, CaptureMode, CaptureView},
};

/// Liveness token for one asynchronous operation within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    session: u64,
    seq: u64,
}

/// Inputs to the machine: user intents, the external open flag, and async results.
#[derive(Debug, Clone)]
pub enum Event {
    /// External `isOpen` flag. Edge-triggered.
    SetOpen(bool),
    CameraReady(Ticket),
    CameraFailed(Ticket, CaptureError),
    CaptureFrame,
    FrameCaptured(Ticket, Result<EncodedImage, CaptureError>),
    Upload(FileSelection),
    FileLoaded(Ticket, Result<EncodedImage, CaptureError>),
    Retake,
    /// Recovery action of the error panel.
    Retry,
    Accept,
    AcceptCropped(Ticket, Result<EncodedImage, CaptureError>),
    Cancel,
}

/// Side effects requested by the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Start a camera lifetime identified by the ticket.
    StartCamera(Ticket),
    /// Release the stream of a camera lifetime.
    StopCamera(Ticket),
    /// Snapshot one frame from the stream of `camera`.
    Snapshot {
        ticket: Ticket,
        camera: Ticket,
        crop: bool,
    },
    ReadFile {
        ticket: Ticket,
        selection: FileSelection,
        crop: bool,
    },
    CropForAccept {
        ticket: Ticket,
        image: EncodedImage,
    },
    DeliverAccept(EncodedImage),
    DeliverCancel,
}

#[derive(Debug, Clone)]
struct ReviewImage {
    image: EncodedImage,
    cropped: bool,
}

#[derive(Debug)]
pub struct CaptureMachine {
    policy: CropPolicy,
    open: bool,
    session: u64,
    next_seq: u64,
    mode: CaptureMode,
    review: Option<ReviewImage>,
    error: Option<CaptureError>,
    permission: CameraPermission,
    camera: Option<Ticket>,
    pending: Option<Ticket>,
}

impl CaptureMachine {
    pub fn new(policy: CropPolicy) -> Self {
        Self {
            policy,
            open: false,
            session: 0,
            next_seq: 0,
            mode: CaptureMode::Idle,
            review: None,
            error: None,
            permission: CameraPermission::Unknown,
            camera: None,
            pending: None,
        }
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Whether `ticket` names the camera lifetime currently wanted.
    pub fn is_live_camera(&self, ticket: Ticket) -> bool {
        self.camera == Some(ticket)
    }

    pub fn view(&self) -> CaptureView {
        CaptureView {
            mode: self.mode,
            image: self.review.as_ref().map(|review| review.image.clone()),
            error: self.error.clone(),
            permission: self.permission,
        }
    }

    pub fn handle(&mut self, event: Event) -> Vec<Command> {
        let mut commands = Vec::new();
        let from = self.mode;
        self.apply(event, &mut commands);
        if from != self.mode {
            log::debug!("Capture mode {:?} -> {:?}", from, self.mode);
        }
        debug_assert!(self.invariants_hold(), "capture invariants violated");
        commands
    }

    fn apply(&mut self, event: Event, out: &mut Vec<Command>) {
        match event {
            Event::SetOpen(true) => {
                if !self.open {
                    self.begin_session();
                    log::info!("Capture session {} opened", self.session);
                    self.enter_camera(out);
                }
            }
            Event::SetOpen(false) => self.close(out),
            Event::Cancel => {
                if self.open {
                    self.close(out);
                    out.push(Command::DeliverCancel);
                }
            }

            Event::CameraReady(ticket) => {
                if self.is_live_camera(ticket) {
                    self.permission = CameraPermission::Granted;
                    log::debug!("Camera stream ready");
                } else {
                    log::debug!("Ignoring stale camera-ready signal");
                }
            }
            Event::CameraFailed(ticket, error) => {
                if !self.is_live_camera(ticket) {
                    log::debug!("Ignoring stale camera failure: {}", error);
                    return;
                }
                log::warn!("Camera failed: {}", error);
                self.permission = CameraPermission::Denied;
                self.camera = None;
                if self.mode == CaptureMode::CameraActive {
                    self.pending = None;
                    self.enter_error(error, out);
                }
            }

            Event::CaptureFrame => {
                if self.mode != CaptureMode::CameraActive || self.pending.is_some() {
                    return;
                }
                let Some(camera) = self.camera else {
                    self.enter_error(CaptureError::CaptureFailed, out);
                    return;
                };
                let ticket = self.issue();
                self.pending = Some(ticket);
                out.push(Command::Snapshot {
                    ticket,
                    camera,
                    crop: self.policy.crop_at_capture(),
                });
            }
            Event::FrameCaptured(ticket, result) => {
                if self.mode == CaptureMode::CameraActive && self.take_pending(ticket) {
                    self.finish_acquisition(result, out);
                }
            }

            Event::Upload(selection) => {
                match self.mode {
                    CaptureMode::Idle => {
                        self.begin_session();
                        log::info!("Upload-only capture session {} opened", self.session);
                    }
                    CaptureMode::CameraActive => {}
                    _ => return,
                }
                let ticket = self.issue();
                self.pending = Some(ticket);
                self.mode = CaptureMode::Loading;
                out.push(Command::ReadFile {
                    ticket,
                    selection,
                    crop: self.policy.crop_at_capture(),
                });
            }
            Event::FileLoaded(ticket, result) => {
                if self.mode == CaptureMode::Loading && self.take_pending(ticket) {
                    self.finish_acquisition(result, out);
                }
            }

            Event::Retake => {
                if self.mode == CaptureMode::Review {
                    self.review = None;
                    self.pending = None;
                    self.enter_camera(out);
                }
            }
            Event::Retry => {
                if self.mode == CaptureMode::Error {
                    self.error = None;
                    self.enter_camera(out);
                }
            }

            Event::Accept => {
                if self.mode != CaptureMode::Review || self.pending.is_some() {
                    return;
                }
                let Some(review) = self.review.clone() else {
                    return;
                };
                if review.cropped {
                    self.deliver(review.image, out);
                } else {
                    let ticket = self.issue();
                    self.pending = Some(ticket);
                    out.push(Command::CropForAccept {
                        ticket,
                        image: review.image,
                    });
                }
            }
            Event::AcceptCropped(ticket, result) => {
                if self.mode != CaptureMode::Review || !self.take_pending(ticket) {
                    return;
                }
                match result {
                    Ok(image) => self.deliver(image, out),
                    Err(error) => {
                        self.review = None;
                        self.enter_error(error, out);
                    }
                }
            }
        }
    }

    fn begin_session(&mut self) {
        self.open = true;
        self.session += 1;
        self.next_seq = 0;
    }

    fn issue(&mut self) -> Ticket {
        self.next_seq += 1;
        Ticket {
            session: self.session,
            seq: self.next_seq,
        }
    }

    fn take_pending(&mut self, ticket: Ticket) -> bool {
        if self.pending == Some(ticket) {
            self.pending = None;
            true
        } else {
            log::debug!("Ignoring stale result for {:?}", ticket);
            false
        }
    }

    fn release_camera(&mut self, out: &mut Vec<Command>) {
        if let Some(camera) = self.camera.take() {
            out.push(Command::StopCamera(camera));
        }
    }

    fn enter_camera(&mut self, out: &mut Vec<Command>) {
        self.release_camera(out);
        let ticket = self.issue();
        self.camera = Some(ticket);
        self.mode = CaptureMode::CameraActive;
        out.push(Command::StartCamera(ticket));
    }

    fn enter_error(&mut self, error: CaptureError, out: &mut Vec<Command>) {
        self.release_camera(out);
        self.error = Some(error);
        self.mode = CaptureMode::Error;
    }

    fn finish_acquisition(
        &mut self,
        result: Result<EncodedImage, CaptureError>,
        out: &mut Vec<Command>,
    ) {
        match result {
            Ok(image) => {
                self.release_camera(out);
                self.error = None;
                self.review = Some(ReviewImage {
                    image,
                    cropped: self.policy.crop_at_capture(),
                });
                self.mode = CaptureMode::Review;
            }
            Err(error) => self.enter_error(error, out),
        }
    }

    fn deliver(&mut self, image: EncodedImage, out: &mut Vec<Command>) {
        log::info!("Capture session {} accepted", self.session);
        self.close(out);
        out.push(Command::DeliverAccept(image));
    }

    /// Discard all session state. Closing an idle machine does nothing.
    fn close(&mut self, out: &mut Vec<Command>) {
        if !self.open && self.mode == CaptureMode::Idle {
            return;
        }
        self.release_camera(out);
        self.open = false;
        self.mode = CaptureMode::Idle;
        self.review = None;
        self.error = None;
        self.pending = None;
        log::info!("Capture session {} closed", self.session);
    }

    fn invariants_hold(&self) -> bool {
        let review_ok = (self.mode == CaptureMode::Review) == self.review.is_some();
        let error_ok = (self.mode == CaptureMode::Error) == self.error.is_some();
        let idle_ok = self.mode != CaptureMode::Idle || (!self.open && self.camera.is_none());
        review_ok && error_ok && idle_ok
    }
}
