//! LibreTranslate-compatible HTTP backend
//!
//! Sends the whole batch as one request (`q` is an array) and expects the
//! `translatedText` array back in the same order.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{TranslateError, TranslationEngine};
use crate::config::TranslationSettings;

/// Translation request body
#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a [String],
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

/// Translation response body
#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: Vec<String>,
}

/// Engine calling a LibreTranslate `/translate` endpoint
pub struct LibreTranslateEngine {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    source_language: String,
    target_language: String,
}

impl LibreTranslateEngine {
    pub fn new(
        endpoint: impl Into<String>,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: None,
            source_language: source_language.into(),
            target_language: target_language.into(),
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    pub fn from_settings(settings: &TranslationSettings) -> Result<Self> {
        let endpoint = settings
            .endpoint
            .clone()
            .filter(|e| !e.trim().is_empty())
            .context("translation.endpoint must be set for the libre_translate backend")?;

        Ok(Self::new(
            endpoint,
            &settings.source_language,
            &settings.target_language,
        )?
        .with_api_key(settings.api_key.clone()))
    }
}

#[async_trait]
impl TranslationEngine for LibreTranslateEngine {
    fn name(&self) -> &'static str {
        "libre_translate"
    }

    async fn translate_batch(&self, texts: &[String]) -> Result<Vec<String>, TranslateError> {
        let request = TranslateRequest {
            q: texts,
            source: &self.source_language,
            target: &self.target_language,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        debug!("Sending {} texts to {}", texts.len(), self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| TranslateError::ServiceUnavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TranslateError::ServiceUnavailable(e.to_string()))?;

        parse_response(status, &body, texts.len())
    }
}

/// Map an HTTP status and body onto the translation result
fn parse_response(
    status: StatusCode,
    body: &str,
    expected: usize,
) -> Result<Vec<String>, TranslateError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(TranslateError::RateLimited);
    }
    if !status.is_success() {
        warn!("Translation request failed with {}: {}", status, body);
        return Err(TranslateError::ServiceUnavailable(format!("HTTP {}", status)));
    }

    let parsed: TranslateResponse = serde_json::from_str(body)
        .map_err(|e| TranslateError::MalformedResponse(e.to_string()))?;

    if parsed.translated_text.len() != expected {
        return Err(TranslateError::MalformedResponse(format!(
            "expected {} translations, got {}",
            expected,
            parsed.translated_text.len()
        )));
    }
    Ok(parsed.translated_text)
}
