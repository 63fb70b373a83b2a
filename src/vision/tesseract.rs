//! Tesseract backend
//!
//! Runs recognition through `rusty_tesseract` and turns the word rows of its
//! data output into OCR candidates.

use async_trait::async_trait;
use image::DynamicImage;
use parking_lot::Mutex;
use rusty_tesseract::{Args, Data, Image};
use tracing::{debug, warn};

use super::{
    group_into_lines, BoundingBox, LanguageAssets, OcrCandidate, OcrEngine, OcrError,
    OcrGranularity,
};
use crate::capture::Frame;

/// `level` of word rows in tesseract data output
const WORD_LEVEL: i32 = 5;

/// Block, paragraph and line a word belongs to
type LinePosition = (i32, i32, i32);

/// OCR engine driving the installed `tesseract`
pub struct TesseractEngine {
    granularity: OcrGranularity,
    /// Recognition arguments, set once the language is loaded
    args: Mutex<Option<Args>>,
}

impl TesseractEngine {
    pub fn new() -> Self {
        Self {
            granularity: OcrGranularity::Word,
            args: Mutex::new(None),
        }
    }

    pub fn with_granularity(mut self, granularity: OcrGranularity) -> Self {
        self.granularity = granularity;
        self
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    async fn load(&self, assets: &LanguageAssets) -> Result<(), OcrError> {
        // Tesseract resolves language data through this variable.
        if let Some(dir) = &assets.data_dir {
            std::env::set_var("TESSDATA_PREFIX", dir);
        }

        let available = tokio::task::spawn_blocking(rusty_tesseract::get_tesseract_langs)
            .await
            .map_err(|e| OcrError::AssetLoadFailed(e.to_string()))?
            .map_err(|e| OcrError::AssetLoadFailed(format!("cannot run tesseract: {}", e)))?;
        debug!("Tesseract languages available: {:?}", available);

        let missing = missing_languages(&assets.language, &available);
        if !missing.is_empty() {
            return Err(OcrError::AssetLoadFailed(format!(
                "language data not found for: {}",
                missing.join(", ")
            )));
        }

        *self.args.lock() = Some(Args {
            lang: assets.language.clone(),
            ..Args::default()
        });
        Ok(())
    }

    async fn detect(&self, frame: &Frame) -> Result<Vec<OcrCandidate>, OcrError> {
        let args = self.args.lock().clone().ok_or(OcrError::NotInitialized)?;
        let picture = DynamicImage::ImageRgba8(frame.to_image());

        let words = tokio::task::spawn_blocking(move || {
            let image = Image::from_dynamic_image(&picture)
                .map_err(|e| OcrError::EngineFailure(e.to_string()))?;
            let output = rusty_tesseract::image_to_data(&image, &args).map_err(|e| {
                warn!("tesseract failed: {}", e);
                OcrError::EngineFailure(e.to_string())
            })?;
            Ok::<_, OcrError>(word_candidates(&output.data))
        })
        .await
        .map_err(|e| OcrError::EngineFailure(e.to_string()))??;

        Ok(match self.granularity {
            OcrGranularity::Word => words.into_iter().map(|(_, word)| word).collect(),
            OcrGranularity::Line => group_into_lines(words),
        })
    }

    async fn unload(&self) {
        self.args.lock().take();
    }
}

/// Requested `+`-joined languages that are not installed
fn missing_languages<'a>(requested: &'a str, available: &[String]) -> Vec<&'a str> {
    requested
        .split('+')
        .filter(|lang| !available.iter().any(|a| a == lang))
        .collect()
}

/// Word rows with non-blank text, keyed by their line
fn word_candidates(rows: &[Data]) -> Vec<(LinePosition, OcrCandidate)> {
    rows.iter()
        .filter(|row| row.level == WORD_LEVEL && !row.text.trim().is_empty())
        .map(|row| {
            (
                (row.block_num, row.par_num, row.line_num),
                OcrCandidate {
                    text: row.text.trim().to_string(),
                    bbox: BoundingBox::from_xywh(
                        row.left.max(0) as u32,
                        row.top.max(0) as u32,
                        row.width.max(0) as u32,
                        row.height.max(0) as u32,
                    ),
                    confidence: row.conf,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(level: i32, line_num: i32, left: i32, width: i32, conf: f32, text: &str) -> Data {
        Data {
            level,
            page_num: 1,
            block_num: 1,
            par_num: 1,
            line_num,
            word_num: 1,
            left,
            top: 100,
            width,
            height: 40,
            conf,
            text: text.to_string(),
        }
    }

    fn sample() -> Vec<Data> {
        vec![
            row(1, 0, 0, 1920, -1.0, ""),
            row(4, 1, 100, 400, -1.0, ""),
            row(5, 1, 100, 200, 95.5, "こんにちは"),
            row(5, 1, 310, 190, 41.0, "world"),
            row(5, 1, 510, 10, 88.0, " "),
            row(5, 2, 100, 80, 77.0, "bye"),
        ]
    }

    #[test]
    fn test_word_candidates_keep_word_rows() {
        let words = word_candidates(&sample());
        assert_eq!(words.len(), 3);

        let (position, first) = &words[0];
        assert_eq!(first.text, "こんにちは");
        assert_eq!(first.bbox, BoundingBox::new(100, 100, 300, 140));
        assert!((first.confidence - 95.5).abs() < 0.001);
        assert_eq!(*position, (1, 1, 1));

        assert_eq!(words[2].1.text, "bye");
        assert_eq!(words[2].0, (1, 1, 2));
    }

    #[test]
    fn test_word_candidates_group_into_lines() {
        let lines = group_into_lines(word_candidates(&sample()));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "こんにちは world");
        assert_eq!(lines[0].bbox, BoundingBox::new(100, 100, 500, 140));
    }

    #[test]
    fn test_word_candidates_clamp_negative_geometry() {
        let words = word_candidates(&[row(5, 1, -5, 30, 90.0, "edge")]);
        assert_eq!(words[0].1.bbox, BoundingBox::new(0, 100, 30, 140));
    }

    #[test]
    fn test_missing_languages() {
        let available = vec!["eng".to_string(), "jpn".to_string(), "osd".to_string()];
        assert!(missing_languages("jpn+eng", &available).is_empty());
        assert_eq!(missing_languages("jpn+kor", &available), vec!["kor"]);
    }

    #[tokio::test]
    async fn test_unknown_language_is_asset_load_failure() {
        let engine = TesseractEngine::new();
        let result = engine.load(&LanguageAssets::new("zz_not_a_language")).await;
        assert!(matches!(result, Err(OcrError::AssetLoadFailed(_))));
    }

    #[tokio::test]
    async fn test_detect_without_load_fails() {
        let engine = TesseractEngine::new();
        let frame = Frame::new(vec![0; 16], 2, 2).unwrap();
        assert!(matches!(engine.detect(&frame).await, Err(OcrError::NotInitialized)));
    }
}
