//! Vision/OCR Layer
//!
//! Turns captured frames into located text regions. The OCR engine itself is
//! pluggable behind [`OcrEngine`]:
//! - Tesseract (command-line engine, any platform)
//! - Windows OCR API (Windows only)
//!
//! [`TextRecognizer`] owns the engine lifecycle and drops low-confidence
//! detections before anything downstream sees them.

pub mod tesseract;
#[cfg(windows)]
pub mod windows_ocr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

use crate::capture::Frame;
use crate::config::OcrSettings;

pub use tesseract::TesseractEngine;

/// Detections at or below this confidence (0-100 scale) are discarded
pub const DEFAULT_MIN_CONFIDENCE: f32 = 70.0;

/// OCR failures
#[derive(Debug, Clone, Error)]
pub enum OcrError {
    #[error("OCR engine is not initialized")]
    NotInitialized,
    #[error("failed to load OCR language data: {0}")]
    AssetLoadFailed(String),
    #[error("OCR engine failure: {0}")]
    EngineFailure(String),
    #[error("OCR timed out after {0} ms")]
    Timeout(u64),
}

/// OCR backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrBackend {
    /// Tesseract command-line engine
    #[default]
    Tesseract,
    /// Windows built-in OCR
    Windows,
}

/// OCR result granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrGranularity {
    /// Individual words with their bounding boxes
    #[default]
    Word,
    /// Full lines with their bounding boxes
    Line,
}

/// Axis-aligned box in frame pixel coordinates. Always `x1 >= x0`, `y1 >= y0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl BoundingBox {
    /// Build a box from two corners in any order
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Build a box from origin and size
    pub fn from_xywh(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self::new(x, y, x.saturating_add(width), y.saturating_add(height))
    }

    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }

    /// Zero-area boxes are valid but render as nothing
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Smallest box containing both
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

/// Raw detection as reported by an engine, before filtering
#[derive(Debug, Clone, PartialEq)]
pub struct OcrCandidate {
    pub text: String,
    pub bbox: BoundingBox,
    /// Engine confidence, 0-100
    pub confidence: f32,
}

/// Text found in a frame. `text` is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedRegion {
    pub text: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// Where an engine finds its language data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageAssets {
    /// Engine language code, e.g. `eng`, `jpn+eng` or `ja`
    pub language: String,
    /// Directory holding the model files; engine default when `None`
    pub data_dir: Option<PathBuf>,
}

impl LanguageAssets {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            data_dir: None,
        }
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }
}

/// A black-box text detection service
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Engine name for logs
    fn name(&self) -> &'static str;

    /// Load model/language data
    async fn load(&self, assets: &LanguageAssets) -> Result<(), OcrError>;

    /// Detect text in a frame, in the engine's native order
    async fn detect(&self, frame: &Frame) -> Result<Vec<OcrCandidate>, OcrError>;

    /// Release engine resources
    async fn unload(&self);
}

/// Confidence filter: strictly greater than the threshold passes
pub fn passes_confidence(confidence: f32, threshold: f32) -> bool {
    confidence > threshold
}

/// Wraps an [`OcrEngine`] with lifecycle tracking and confidence filtering
pub struct TextRecognizer {
    engine: Box<dyn OcrEngine>,
    min_confidence: f32,
    initialized: AtomicBool,
}

impl TextRecognizer {
    pub fn new(engine: Box<dyn OcrEngine>) -> Self {
        Self {
            engine,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Load language data. Calling it again once loaded is a no-op.
    pub async fn initialize(&self, assets: &LanguageAssets) -> Result<(), OcrError> {
        if self.is_initialized() {
            return Ok(());
        }

        info!(
            "Initializing {} OCR engine (language: {})",
            self.engine.name(),
            assets.language
        );
        if let Some(dir) = &assets.data_dir {
            info!("Using language data from: {:?}", dir);
        }

        self.engine.load(assets).await?;
        self.initialized.store(true, Ordering::Release);
        info!("{} OCR engine initialized", self.engine.name());
        Ok(())
    }

    /// Recognize text in `frame`, keeping only confident, non-blank regions
    pub async fn recognize(&self, frame: &Frame) -> Result<Vec<RecognizedRegion>, OcrError> {
        if !self.is_initialized() {
            return Err(OcrError::NotInitialized);
        }

        let start = Instant::now();
        let candidates = self.engine.detect(frame).await?;
        let total = candidates.len();

        let regions: Vec<RecognizedRegion> = candidates
            .into_iter()
            .filter(|c| passes_confidence(c.confidence, self.min_confidence))
            .filter_map(|c| {
                let text = c.text.trim();
                if text.is_empty() {
                    return None;
                }
                Some(RecognizedRegion {
                    text: text.to_string(),
                    bbox: c.bbox,
                    confidence: c.confidence,
                })
            })
            .collect();

        debug!(
            "OCR on {}x{} frame complete in {:?}: {} of {} detections kept",
            frame.width(),
            frame.height(),
            start.elapsed(),
            regions.len(),
            total
        );
        Ok(regions)
    }

    /// Release engine resources. Safe to call repeatedly.
    pub async fn terminate(&self) {
        if self.initialized.swap(false, Ordering::AcqRel) {
            self.engine.unload().await;
            info!("{} OCR engine terminated", self.engine.name());
        }
    }
}

/// Build the engine selected in the configuration
pub fn engine_from_config(settings: &OcrSettings) -> anyhow::Result<Box<dyn OcrEngine>> {
    match settings.backend {
        OcrBackend::Tesseract => Ok(Box::new(
            TesseractEngine::new().with_granularity(settings.granularity),
        )),
        #[cfg(windows)]
        OcrBackend::Windows => Ok(Box::new(windows_ocr::WindowsOcr::new(settings.granularity))),
        #[cfg(not(windows))]
        OcrBackend::Windows => anyhow::bail!("the Windows OCR backend is only available on Windows"),
    }
}

/// Language assets described by the configuration
pub fn assets_from_config(settings: &OcrSettings) -> LanguageAssets {
    let assets = LanguageAssets::new(&settings.language);
    match &settings.tessdata_dir {
        Some(dir) => assets.with_data_dir(dir),
        None => assets,
    }
}

/// Merge word candidates into line candidates.
///
/// `line_key` identifies the line each word belongs to; words keep their
/// relative order and lines appear in order of their first word. Line
/// confidence is the mean of its words.
pub fn group_into_lines<K: PartialEq>(words: Vec<(K, OcrCandidate)>) -> Vec<OcrCandidate> {
    let mut lines: Vec<(K, OcrCandidate, usize)> = Vec::new();

    for (key, word) in words {
        match lines.iter_mut().find(|(k, _, _)| *k == key) {
            Some((_, line, count)) => {
                line.text.push(' ');
                line.text.push_str(&word.text);
                line.bbox = line.bbox.union(&word.bbox);
                line.confidence += word.confidence;
                *count += 1;
            }
            None => lines.push((key, word, 1)),
        }
    }

    lines
        .into_iter()
        .map(|(_, mut line, count)| {
            line.confidence /= count as f32;
            line
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Engine returning a fixed list of candidates
    struct StaticEngine {
        candidates: Vec<OcrCandidate>,
        loads: Mutex<u32>,
        fail_load: bool,
    }

    impl StaticEngine {
        fn new(candidates: Vec<OcrCandidate>) -> Self {
            Self {
                candidates,
                loads: Mutex::new(0),
                fail_load: false,
            }
        }
    }

    #[async_trait]
    impl OcrEngine for StaticEngine {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn load(&self, assets: &LanguageAssets) -> Result<(), OcrError> {
            if self.fail_load {
                return Err(OcrError::AssetLoadFailed(assets.language.clone()));
            }
            *self.loads.lock() += 1;
            Ok(())
        }

        async fn detect(&self, _frame: &Frame) -> Result<Vec<OcrCandidate>, OcrError> {
            Ok(self.candidates.clone())
        }

        async fn unload(&self) {}
    }

    fn candidate(text: &str, confidence: f32) -> OcrCandidate {
        OcrCandidate {
            text: text.to_string(),
            bbox: BoundingBox::new(0, 0, 10, 10),
            confidence,
        }
    }

    fn frame() -> Frame {
        Frame::new(vec![0; 16], 2, 2).unwrap()
    }

    #[test]
    fn test_bounding_box_normalizes_corners() {
        let bbox = BoundingBox::new(300, 140, 100, 100);
        assert_eq!(bbox, BoundingBox::new(100, 100, 300, 140));
        assert_eq!(bbox.width(), 200);
        assert_eq!(bbox.height(), 40);
    }

    #[test]
    fn test_zero_area_box_is_empty() {
        assert!(BoundingBox::new(5, 5, 5, 20).is_empty());
        assert!(!BoundingBox::from_xywh(5, 5, 1, 1).is_empty());
    }

    #[test]
    fn test_confidence_threshold_is_exclusive() {
        assert!(!passes_confidence(70.0, DEFAULT_MIN_CONFIDENCE));
        assert!(passes_confidence(70.01, DEFAULT_MIN_CONFIDENCE));
        assert!(!passes_confidence(12.0, DEFAULT_MIN_CONFIDENCE));
    }

    #[tokio::test]
    async fn test_recognize_before_initialize_fails() {
        let recognizer = TextRecognizer::new(Box::new(StaticEngine::new(vec![])));
        let result = recognizer.recognize(&frame()).await;
        assert!(matches!(result, Err(OcrError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_recognize_filters_low_confidence() {
        let engine = StaticEngine::new(vec![
            candidate("keep", 95.0),
            candidate("edge", 70.0),
            candidate("drop", 42.0),
            candidate("also", 70.5),
        ]);
        let recognizer = TextRecognizer::new(Box::new(engine));
        recognizer.initialize(&LanguageAssets::new("eng")).await.unwrap();

        let regions = recognizer.recognize(&frame()).await.unwrap();
        let texts: Vec<&str> = regions.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["keep", "also"]);
    }

    #[tokio::test]
    async fn test_recognize_drops_blank_text() {
        let engine = StaticEngine::new(vec![candidate("   ", 99.0), candidate(" hi ", 99.0)]);
        let recognizer = TextRecognizer::new(Box::new(engine));
        recognizer.initialize(&LanguageAssets::new("eng")).await.unwrap();

        let regions = recognizer.recognize(&frame()).await.unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].text, "hi");
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let recognizer = TextRecognizer::new(Box::new(StaticEngine::new(vec![])));
        let assets = LanguageAssets::new("eng");
        recognizer.initialize(&assets).await.unwrap();
        recognizer.initialize(&assets).await.unwrap();
        assert!(recognizer.is_initialized());
    }

    #[tokio::test]
    async fn test_initialize_failure_leaves_uninitialized() {
        let mut engine = StaticEngine::new(vec![]);
        engine.fail_load = true;
        let recognizer = TextRecognizer::new(Box::new(engine));

        let result = recognizer.initialize(&LanguageAssets::new("xyz")).await;
        assert!(matches!(result, Err(OcrError::AssetLoadFailed(_))));
        assert!(!recognizer.is_initialized());
    }

    #[tokio::test]
    async fn test_terminate_then_recognize_fails() {
        let recognizer = TextRecognizer::new(Box::new(StaticEngine::new(vec![candidate("a", 99.0)])));
        recognizer.initialize(&LanguageAssets::new("eng")).await.unwrap();

        recognizer.terminate().await;
        recognizer.terminate().await;

        let result = recognizer.recognize(&frame()).await;
        assert!(matches!(result, Err(OcrError::NotInitialized)));
    }

    #[test]
    fn test_group_into_lines() {
        let words = vec![
            (1, OcrCandidate { text: "Hello".into(), bbox: BoundingBox::new(0, 0, 50, 20), confidence: 90.0 }),
            (2, OcrCandidate { text: "Other".into(), bbox: BoundingBox::new(0, 40, 50, 60), confidence: 80.0 }),
            (1, OcrCandidate { text: "world".into(), bbox: BoundingBox::new(60, 2, 120, 22), confidence: 70.0 }),
        ];

        let lines = group_into_lines(words);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Hello world");
        assert_eq!(lines[0].bbox, BoundingBox::new(0, 0, 120, 22));
        assert!((lines[0].confidence - 80.0).abs() < 0.001);
        assert_eq!(lines[1].text, "Other");
    }
}
