//! Translation Layer
//!
//! Converts batches of recognized text into translated text. Engines sit
//! behind [`TranslationEngine`]; [`Translator`] enforces the batch contract
//! (same length, same order, never an empty translation).

pub mod libre;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::TranslationSettings;
use crate::vision::{BoundingBox, RecognizedRegion};

pub use libre::LibreTranslateEngine;

/// Translation failures. Any of them voids the whole batch.
#[derive(Debug, Clone, Error)]
pub enum TranslateError {
    #[error("translation service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("translation service rate limited")]
    RateLimited,
    #[error("malformed translation response: {0}")]
    MalformedResponse(String),
    #[error("translation timed out after {0} ms")]
    Timeout(u64),
}

/// Translation engine selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationBackend {
    /// Offline engine that tags the source text
    #[default]
    Tagging,
    /// LibreTranslate-compatible HTTP API
    LibreTranslate,
}

/// A recognized region together with its translation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatedRegion {
    pub text: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub translated: String,
}

impl TranslatedRegion {
    pub fn new(region: RecognizedRegion, translated: String) -> Self {
        Self {
            text: region.text,
            bbox: region.bbox,
            confidence: region.confidence,
            translated,
        }
    }
}

/// A black-box batch translation service
#[async_trait]
pub trait TranslationEngine: Send + Sync {
    /// Engine name for logs
    fn name(&self) -> &'static str;

    /// Translate `texts`, returning one string per input in the same order
    async fn translate_batch(&self, texts: &[String]) -> Result<Vec<String>, TranslateError>;
}

/// Applies a [`TranslationEngine`] to recognized regions
pub struct Translator {
    engine: Box<dyn TranslationEngine>,
}

impl Translator {
    pub fn new(engine: Box<dyn TranslationEngine>) -> Self {
        Self { engine }
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Translate regions one-to-one. An empty input never reaches the engine.
    pub async fn translate(
        &self,
        regions: Vec<RecognizedRegion>,
    ) -> Result<Vec<TranslatedRegion>, TranslateError> {
        if regions.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = regions.iter().map(|r| r.text.clone()).collect();
        let translations = self.engine.translate_batch(&texts).await?;

        if translations.len() != regions.len() {
            return Err(TranslateError::MalformedResponse(format!(
                "expected {} translations, got {}",
                regions.len(),
                translations.len()
            )));
        }

        debug!("{} translated {} regions", self.engine.name(), regions.len());

        Ok(regions
            .into_iter()
            .zip(translations)
            .map(|(region, translated)| {
                let translated = if translated.trim().is_empty() {
                    region.text.clone()
                } else {
                    translated
                };
                TranslatedRegion::new(region, translated)
            })
            .collect())
    }
}

/// Offline engine that prefixes each text with a tag, e.g. `[JP] text`
pub struct TaggingEngine {
    tag: String,
    latency: Duration,
}

impl TaggingEngine {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            latency: Duration::from_millis(100),
        }
    }

    /// Simulated round-trip time per batch
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl TranslationEngine for TaggingEngine {
    fn name(&self) -> &'static str {
        "tagging"
    }

    async fn translate_batch(&self, texts: &[String]) -> Result<Vec<String>, TranslateError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(texts
            .iter()
            .map(|text| {
                if self.tag.is_empty() {
                    text.clone()
                } else {
                    format!("{} {}", self.tag, text)
                }
            })
            .collect())
    }
}

/// Build the engine selected in the configuration
pub fn engine_from_config(
    settings: &TranslationSettings,
) -> anyhow::Result<Box<dyn TranslationEngine>> {
    match settings.backend {
        TranslationBackend::Tagging => Ok(Box::new(TaggingEngine::new(&settings.tag))),
        TranslationBackend::LibreTranslate => Ok(Box::new(LibreTranslateEngine::from_settings(settings)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct ScriptedEngine {
        reply: Result<Vec<String>, TranslateError>,
        calls: Arc<Mutex<u32>>,
    }

    impl ScriptedEngine {
        fn replying(reply: Result<Vec<String>, TranslateError>) -> Self {
            Self {
                reply,
                calls: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl TranslationEngine for ScriptedEngine {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn translate_batch(&self, _texts: &[String]) -> Result<Vec<String>, TranslateError> {
            *self.calls.lock() += 1;
            self.reply.clone()
        }
    }

    fn region(text: &str, x: u32) -> RecognizedRegion {
        RecognizedRegion {
            text: text.to_string(),
            bbox: BoundingBox::new(x, 0, x + 10, 10),
            confidence: 90.0,
        }
    }

    #[tokio::test]
    async fn test_empty_input_skips_engine() {
        let engine = ScriptedEngine::replying(Err(TranslateError::RateLimited));
        let calls = engine.calls.clone();
        let translator = Translator::new(Box::new(engine));

        let result = translator.translate(vec![]).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(*calls.lock(), 0);
    }

    #[tokio::test]
    async fn test_preserves_order_and_geometry() {
        let translator = Translator::new(Box::new(TaggingEngine::new("[JP]").with_latency(Duration::ZERO)));
        let input = vec![region("いち", 0), region("に", 20), region("さん", 40)];

        let output = translator.translate(input.clone()).await.unwrap();

        assert_eq!(output.len(), input.len());
        for (out, inp) in output.iter().zip(&input) {
            assert_eq!(out.text, inp.text);
            assert_eq!(out.bbox, inp.bbox);
            assert_eq!(out.translated, format!("[JP] {}", inp.text));
        }
    }

    #[tokio::test]
    async fn test_length_mismatch_is_malformed() {
        let translator = Translator::new(Box::new(ScriptedEngine::replying(Ok(vec!["only one".into()]))));

        let result = translator.translate(vec![region("a", 0), region("b", 20)]).await;
        assert!(matches!(result, Err(TranslateError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_empty_translation_falls_back_to_source() {
        let translator = Translator::new(Box::new(ScriptedEngine::replying(Ok(vec![
            "".into(),
            "Hello".into(),
        ]))));

        let output = translator.translate(vec![region("東京", 0), region("こんにちは", 20)]).await.unwrap();
        assert_eq!(output[0].translated, "東京");
        assert_eq!(output[1].translated, "Hello");
    }

    #[tokio::test]
    async fn test_engine_error_fails_whole_batch() {
        let translator = Translator::new(Box::new(ScriptedEngine::replying(Err(TranslateError::RateLimited))));

        let result = translator.translate(vec![region("a", 0)]).await;
        assert!(matches!(result, Err(TranslateError::RateLimited)));
    }
}
