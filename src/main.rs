//! Yakumon - screen-overlay translator
//!
//! Captures a screen, window or image file, recognizes the text on it and
//! floats translations over the original text in a click-through overlay.

mod app;
mod capture;
mod config;
mod overlay;
mod pipeline;
mod shared;
mod translate;
mod vision;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app::{print_sources_json, TranslatorApp};
use crate::capture::{CaptureBackend, SourceId};
use crate::capture::still::StillImageBackend;
use crate::config::{AppConfig, CaptureSettings};
use crate::overlay::{OverlayConfig, OverlayRenderer};
use crate::shared::ControlCommand;
use crate::translate::Translator;
use crate::vision::TextRecognizer;

/// Yakumon - translate text on screen in place
#[derive(Parser, Debug)]
#[command(name = "yakumon")]
#[command(about = "Recognize on-screen text and overlay its translation")]
struct Args {
    /// Source to capture right away (see --list-sources)
    #[arg(short, long)]
    source: Option<String>,

    /// Start capturing the default source right away
    #[arg(long)]
    start: bool,

    /// List capture sources and exit
    #[arg(long)]
    list_sources: bool,

    /// Print listings, status and overlay updates as JSON
    #[arg(long)]
    json: bool,

    /// Capture image files from this directory instead of the screen
    #[arg(long)]
    image_dir: Option<PathBuf>,

    /// Pipeline tick period in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let mut config = load_or_default_config(args.config.as_deref())?;
    if let Some(dir) = &args.image_dir {
        config.capture.image_dir = Some(dir.clone());
    }
    if let Some(interval) = args.interval_ms {
        config.pipeline.tick_interval_ms = interval;
    }

    let backend = build_backend(&config.capture)?;

    if args.list_sources {
        let sources = backend.list_sources().context("Failed to enumerate capture sources")?;
        if args.json {
            print_sources_json(&sources);
        } else {
            println!("Available capture sources ({}):", backend.name());
            if sources.is_empty() {
                println!("  none");
            }
            for source in &sources {
                println!("  {:<24} {}", source.id.as_str(), source.name);
            }
        }
        return Ok(());
    }

    info!("Yakumon starting...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    // OCR is mandatory: a missing language pack aborts startup
    let recognizer = TextRecognizer::new(vision::engine_from_config(&config.ocr)?)
        .with_min_confidence(config.ocr.min_confidence);
    runtime
        .block_on(recognizer.initialize(&vision::assets_from_config(&config.ocr)))
        .context("OCR initialization failed")?;

    let translator = Translator::new(translate::engine_from_config(&config.translation)?);
    info!("Translation engine: {}", translator.engine_name());

    let renderer = Arc::new(OverlayRenderer::new(OverlayConfig::from(&config.overlay)));
    if args.json || cfg!(not(feature = "gui")) {
        overlay::spawn_headless_presenter(&renderer, args.json);
    }

    let initial = match (args.source, args.start) {
        (Some(id), _) => Some(ControlCommand::Start(Some(SourceId::new(id)))),
        (None, true) => Some(ControlCommand::Start(None)),
        (None, false) => None,
    };

    let app = Arc::new(
        TranslatorApp::new(
            config,
            backend,
            Arc::new(recognizer),
            Arc::new(translator),
            renderer.clone(),
        )
        .with_json_output(args.json),
    );
    let shutdown = CancellationToken::new();

    #[cfg(feature = "gui")]
    {
        let session = {
            let shutdown = shutdown.clone();
            std::thread::spawn(move || runtime.block_on(run_session(app, initial, shutdown)))
        };
        overlay::window::run(renderer, shutdown.clone());
        shutdown.cancel();
        if session.join().is_err() {
            warn!("Session thread panicked");
        }
    }

    #[cfg(not(feature = "gui"))]
    {
        drop(renderer);
        runtime.block_on(run_session(app, initial, shutdown));
    }

    info!("Yakumon shutdown complete");
    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

/// Load the configuration file, or defaults when the default file is absent
fn load_or_default_config(path: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = path {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    match config::default_config_path() {
        Ok(path) if path.exists() => {
            let config = config::load_config(&path)?;
            info!("Loaded configuration from {:?}", path);
            Ok(config)
        }
        Ok(path) => {
            info!("Using default configuration");
            let config = AppConfig::default();
            match config::save_config(&config, &path) {
                Ok(()) => info!("Wrote default configuration to {:?}", path),
                Err(e) => warn!("Could not write default configuration to {:?}: {}", path, e),
            }
            Ok(config)
        }
        Err(e) => {
            warn!("{}; using default configuration", e);
            Ok(AppConfig::default())
        }
    }
}

fn build_backend(settings: &CaptureSettings) -> Result<Arc<dyn CaptureBackend>> {
    if let Some(dir) = &settings.image_dir {
        if !dir.is_dir() {
            bail!("Image directory {:?} does not exist", dir);
        }
        info!("Capturing image files from {:?}", dir);
        return Ok(Arc::new(StillImageBackend::new(
            dir,
            settings.max_fps,
            settings.thumbnail_size,
        )));
    }

    screen_backend(settings)
}

#[cfg(feature = "screen-capture")]
fn screen_backend(settings: &CaptureSettings) -> Result<Arc<dyn CaptureBackend>> {
    Ok(Arc::new(capture::screen::ScreenBackend::new(
        settings.max_fps,
        settings.thumbnail_size,
    )))
}

#[cfg(not(feature = "screen-capture"))]
fn screen_backend(_settings: &CaptureSettings) -> Result<Arc<dyn CaptureBackend>> {
    bail!("No screen capture in this build: pass --image-dir or enable the `screen-capture` feature")
}

/// Run the control surface until quit, end of input or Ctrl-C, then shut down
async fn run_session(
    app: Arc<TranslatorApp>,
    initial: Option<ControlCommand>,
    shutdown: CancellationToken,
) {
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            on_signal.cancel();
        }
    });

    if let Some(command) = initial {
        app.handle(command).await;
    }

    app.run(spawn_stdin_reader(), shutdown.clone()).await;
    app.shutdown().await;
    shutdown.cancel();
}

/// Forward stdin lines to the command loop
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read command input: {}", e);
                    break;
                }
            }
        }
    });
    rx
}
