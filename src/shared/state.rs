//! Application state shared between the coordinator and the control surface

use serde::Serialize;

use crate::capture::SourceId;
use crate::config::AppConfig;
use crate::pipeline::{PipelineState, PipelineStats};

/// Central shared state
#[derive(Debug, Clone)]
pub struct SharedAppState {
    /// Application configuration
    pub config: AppConfig,
    /// Runtime state (not persisted)
    pub runtime: RuntimeState,
}

impl SharedAppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            runtime: RuntimeState::default(),
        }
    }
}

/// Runtime state reported by `status`
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuntimeState {
    /// Whether screen capture is currently active
    pub is_capturing: bool,
    /// Source being captured
    pub active_source: Option<SourceId>,
    /// OCR engine in use
    pub ocr_engine: Option<&'static str>,
    /// Translation engine in use
    pub translation_engine: Option<&'static str>,
    /// Last error message (if any)
    pub last_error: Option<String>,
    /// Labels on the overlay at the last refresh
    pub overlay_labels: usize,
    /// Pipeline counters at the last refresh
    pub stats: PipelineStats,
}

impl RuntimeState {
    /// Mirror the controller's session state and counters
    pub fn refresh(&mut self, pipeline: &PipelineState, stats: PipelineStats, overlay_labels: usize) {
        self.is_capturing = pipeline.is_capturing;
        self.active_source = pipeline.active_source_id.clone();
        self.stats = stats;
        self.overlay_labels = overlay_labels;
    }

    /// Clear any error state
    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Set an error message
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }
}
