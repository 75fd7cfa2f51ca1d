use std::{
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Parser};
use tokio::sync::oneshot;
use vinai_capture::{
    Config,
    capture::{
        CameraPermission, CaptureDependencies, CaptureListener, CaptureManager, CaptureMode,
        CaptureView, CropPreset, EncodedImage, FileSelection,
        file::{save_accepted, write_image},
    },
};

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("VINAI_GIT_HASH"), ")");

#[derive(Parser, Debug)]
#[command(name = "vinai-capture")]
#[command(version = VERSION, about = "Label photo capture and square-crop for the VinAI wine assistant")]
struct Cli {
    /// Config file to use instead of ~/.config/vinai-capture/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Crop preset (label-guide, centered, centered-offset)
    #[arg(long, value_name = "PRESET")]
    preset: Option<CropPreset>,

    /// Upload an image file (path or file:// URI) instead of using the camera
    #[arg(long, value_name = "PATH|URI", conflicts_with = "camera")]
    file: Option<String>,

    /// Capture one frame from the configured camera
    #[arg(long, action = ArgAction::SetTrue)]
    camera: bool,

    /// Write the accepted JPEG to this path
    #[arg(long, short = 'o', value_name = "PATH")]
    output: Option<PathBuf>,

    /// Save the accepted image into the configured save directory
    #[arg(long, action = ArgAction::SetTrue)]
    save: bool,

    /// Print the accepted image as a data URI
    #[arg(long, action = ArgAction::SetTrue)]
    data_uri: bool,
}

/// Forwards the accepted image of a single session to the CLI.
struct OneShotListener {
    accepted: Mutex<Option<oneshot::Sender<EncodedImage>>>,
}

impl OneShotListener {
    fn new() -> (Self, oneshot::Receiver<EncodedImage>) {
        let (tx, rx) = oneshot::channel();
        let listener = Self {
            accepted: Mutex::new(Some(tx)),
        };
        (listener, rx)
    }

    fn take(&self) -> Option<oneshot::Sender<EncodedImage>> {
        self.accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl CaptureListener for OneShotListener {
    fn on_accept(&self, image: EncodedImage) {
        if let Some(tx) = self.take() {
            let _ = tx.send(image);
        }
    }

    fn on_cancel(&self) {
        log::info!("Capture cancelled");
        self.take();
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    if cli.file.is_none() && !cli.camera {
        print_usage();
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(preset) = cli.preset {
        config.crop.preset = preset;
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let (listener, accepted) = OneShotListener::new();
    let dependencies =
        CaptureDependencies::for_device(config.camera.device_path.clone(), Arc::new(listener));
    let manager = CaptureManager::with_dependencies(
        runtime.handle(),
        config.capture_settings(),
        dependencies,
    );

    let image = runtime.block_on(async {
        match &cli.file {
            Some(target) => capture_file(&manager, target, accepted).await,
            None => capture_camera(&manager, accepted).await,
        }
    });
    let image = match image {
        Ok(image) => image,
        Err(err) => {
            log::error!("Capture failed: {:#}", err);
            return Err(err);
        }
    };

    deliver(&cli, &config, &image)
}

async fn capture_file(
    manager: &CaptureManager,
    target: &str,
    accepted: oneshot::Receiver<EncodedImage>,
) -> Result<EncodedImage> {
    let selection = FileSelection::parse(target)?
        .ok_or_else(|| anyhow!("{} is not a supported image file", target))?;

    manager.upload(selection)?;
    let view = manager.wait_until(acquisition_finished).await?;
    accept_reviewed(manager, view, accepted).await
}

async fn capture_camera(
    manager: &CaptureManager,
    accepted: oneshot::Receiver<EncodedImage>,
) -> Result<EncodedImage> {
    manager.set_open(true)?;
    let view = manager
        .wait_until(|v| v.permission == CameraPermission::Granted || v.mode == CaptureMode::Error)
        .await?;
    fail_on_error(&view)?;

    manager.capture_frame()?;
    let view = manager.wait_until(acquisition_finished).await?;
    accept_reviewed(manager, view, accepted).await
}

fn acquisition_finished(view: &CaptureView) -> bool {
    matches!(view.mode, CaptureMode::Review | CaptureMode::Error)
}

async fn accept_reviewed(
    manager: &CaptureManager,
    view: CaptureView,
    accepted: oneshot::Receiver<EncodedImage>,
) -> Result<EncodedImage> {
    fail_on_error(&view)?;

    manager.accept()?;
    let view = manager
        .wait_until(|v| matches!(v.mode, CaptureMode::Idle | CaptureMode::Error))
        .await?;
    fail_on_error(&view)?;

    accepted
        .await
        .map_err(|_| anyhow!("Capture session ended without an accepted image"))
}

fn fail_on_error(view: &CaptureView) -> Result<()> {
    match &view.error {
        Some(error) => Err(error.clone().into()),
        None => Ok(()),
    }
}

fn deliver(cli: &Cli, config: &Config, image: &EncodedImage) -> Result<()> {
    let (width, height) = image.dimensions()?;
    log::info!("Accepted {}x{} {} image", width, height, image.mime_type());

    if let Some(path) = &cli.output {
        write_image(image, path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Saved {}x{} image to {}", width, height, path.display());
    }

    if cli.save {
        let path = save_accepted(image, &config.output.save_config())?;
        println!("Saved {}x{} image to {}", width, height, path.display());
    }

    if cli.data_uri {
        println!("{}", image.as_data_uri());
    }

    if cli.output.is_none() && !cli.save && !cli.data_uri {
        println!("Accepted {}x{} {} image", width, height, image.mime_type());
    }

    Ok(())
}

fn print_usage() {
    println!("vinai-capture: Label photo capture and square-crop for the VinAI wine assistant");
    println!();
    println!("Usage:");
    println!("  vinai-capture --file PATH|URI [--output PATH] [--save] [--data-uri]");
    println!("  vinai-capture --camera [--output PATH] [--save] [--data-uri]");
    println!("  vinai-capture --help");
    println!();
    println!("Options:");
    println!("  --config PATH     Use an alternate config file");
    println!("  --preset PRESET   label-guide (default), centered, centered-offset");
    println!();
    println!("Camera:");
    println!("  Set [camera] device_path in ~/.config/vinai-capture/config.toml");
    println!("  to a still-frame file written by your capture daemon.");
}
