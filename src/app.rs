//! Application Coordinator
//!
//! Connects the control surface to the pipeline: resolves which source to
//! capture, forwards start/stop, keeps the runtime snapshot current and runs
//! the orderly shutdown.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::capture::{select_default_source, CaptureBackend, CaptureError, FrameSource, Source, SourceId};
use crate::config::AppConfig;
use crate::overlay::OverlayRenderer;
use crate::pipeline::PipelineController;
use crate::shared::{ControlCommand, RuntimeState, SharedAppState};
use crate::translate::Translator;
use crate::vision::TextRecognizer;

/// What the command loop should do after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Main application coordinator
pub struct TranslatorApp {
    /// State reported to the control surface
    pub shared_state: Arc<RwLock<SharedAppState>>,
    controller: PipelineController,
    recognizer: Arc<TextRecognizer>,
    renderer: Arc<OverlayRenderer>,
    /// Print listings and status as JSON
    json: bool,
}

impl TranslatorApp {
    /// Create the coordinator. `recognizer` should already be initialized.
    pub fn new(
        config: AppConfig,
        backend: Arc<dyn CaptureBackend>,
        recognizer: Arc<TextRecognizer>,
        translator: Arc<Translator>,
        renderer: Arc<OverlayRenderer>,
    ) -> Self {
        let controller = PipelineController::new(
            FrameSource::new(backend),
            recognizer.clone(),
            translator.clone(),
            renderer.clone(),
            &config.pipeline,
        );

        let mut state = SharedAppState::new(config);
        state.runtime.ocr_engine = Some(recognizer.engine_name());
        state.runtime.translation_engine = Some(translator.engine_name());

        Self {
            shared_state: Arc::new(RwLock::new(state)),
            controller,
            recognizer,
            renderer,
            json: false,
        }
    }

    pub fn with_json_output(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn list_sources(&self) -> Result<Vec<Source>, CaptureError> {
        self.controller.list_sources()
    }

    /// Source to capture when the caller names none: the configured default,
    /// else "Entire Screen", else the first source.
    pub fn resolve_source(&self, requested: Option<SourceId>) -> Result<SourceId, CaptureError> {
        if let Some(id) = requested {
            return Ok(id);
        }
        if let Some(id) = self.shared_state.read().config.capture.default_source.clone() {
            return Ok(SourceId::new(id));
        }

        let sources = self.controller.list_sources()?;
        select_default_source(&sources)
            .map(|source| source.id.clone())
            .ok_or(CaptureError::NoSources)
    }

    /// Start capturing `requested`, or the default source
    pub async fn start_capture(&self, requested: Option<SourceId>) -> Result<SourceId, CaptureError> {
        let result = match self.resolve_source(requested) {
            Ok(id) => self.controller.start(id.clone()).await.map(|_| id),
            Err(e) => Err(e),
        };

        let mut state = self.shared_state.write();
        match &result {
            Ok(_) => state.runtime.clear_error(),
            Err(e) => state.runtime.set_error(e.to_string()),
        }
        state.runtime.refresh(
            &self.controller.state(),
            self.controller.stats(),
            self.renderer.labels().len(),
        );
        result
    }

    pub async fn stop_capture(&self) {
        self.controller.stop().await;
        self.refresh();
    }

    /// Current runtime snapshot
    pub fn status(&self) -> RuntimeState {
        self.refresh();
        self.shared_state.read().runtime.clone()
    }

    fn refresh(&self) {
        let pipeline = self.controller.state();
        let stats = self.controller.stats();
        let labels = self.renderer.labels().len();
        self.shared_state.write().runtime.refresh(&pipeline, stats, labels);
    }

    /// Execute one control command
    pub async fn handle(&self, command: ControlCommand) -> Flow {
        match command {
            ControlCommand::List => {
                match self.list_sources() {
                    Ok(sources) => self.print_sources(&sources),
                    Err(e) => error!("Failed to list sources: {}", e),
                }
                Flow::Continue
            }
            ControlCommand::Start(requested) => {
                match self.start_capture(requested).await {
                    Ok(id) => println!("capturing {}", id),
                    Err(e) => {
                        error!("Could not start capture: {}", e);
                        eprintln!("error: {}", e);
                    }
                }
                Flow::Continue
            }
            ControlCommand::Stop => {
                self.stop_capture().await;
                println!("stopped");
                Flow::Continue
            }
            ControlCommand::Status => {
                self.print_status(&self.status());
                Flow::Continue
            }
            ControlCommand::Quit => Flow::Quit,
        }
    }

    /// Process command lines until `quit`, end of input, or `shutdown` fires
    pub async fn run(&self, mut lines: mpsc::Receiver<String>, shutdown: CancellationToken) {
        info!("Ready for commands: list, start [id], stop, status, quit");
        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                line = lines.recv() => line,
            };
            let Some(line) = line else {
                info!("Control input closed");
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            match line.parse::<ControlCommand>() {
                Ok(command) => {
                    if self.handle(command).await == Flow::Quit {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Ignoring command: {}", e);
                    eprintln!("error: {}", e);
                }
            }
        }
    }

    /// Stop capturing, then release the OCR engine
    pub async fn shutdown(&self) {
        info!("Shutting down...");
        self.controller.stop().await;
        self.recognizer.terminate().await;
        self.refresh();
    }

    fn print_sources(&self, sources: &[Source]) {
        if self.json {
            print_sources_json(sources);
            return;
        }
        if sources.is_empty() {
            println!("No capture sources available");
        }
        for source in sources {
            println!("  {:<24} {}", source.id.as_str(), source.name);
        }
    }

    fn print_status(&self, status: &RuntimeState) {
        if self.json {
            match serde_json::to_string(status) {
                Ok(line) => println!("{}", line),
                Err(e) => error!("Failed to encode status: {}", e),
            }
            return;
        }
        println!(
            "{} | ocr: {} | translation: {} | labels: {} | published: {} dropped: {} recognition failures: {} translation failures: {}",
            match &status.active_source {
                Some(id) if status.is_capturing => format!("capturing {}", id),
                _ => "idle".to_string(),
            },
            status.ocr_engine.unwrap_or("-"),
            status.translation_engine.unwrap_or("-"),
            status.overlay_labels,
            status.stats.passes_published,
            status.stats.ticks_dropped,
            status.stats.recognition_failures,
            status.stats.translation_failures,
        );
        if let Some(e) = &status.last_error {
            println!("last error: {}", e);
        }
    }
}

/// Print sources as JSON, thumbnails as PNG data URLs
pub fn print_sources_json(sources: &[Source]) {
    let listing: Vec<serde_json::Value> = sources
        .iter()
        .map(|source| {
            serde_json::json!({
                "id": source.id,
                "name": source.name,
                "thumbnail": source.thumbnail_data_url(),
            })
        })
        .collect();

    match serde_json::to_string_pretty(&listing) {
        Ok(text) => println!("{}", text),
        Err(e) => error!("Failed to encode source list: {}", e),
    }
}
