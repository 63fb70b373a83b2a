//! Application Configuration
//!
//! User settings stored in TOML format. Every section falls back to its
//! defaults when missing from the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::translate::TranslationBackend;
use crate::vision::{OcrBackend, OcrGranularity, DEFAULT_MIN_CONFIDENCE};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Capture settings
    pub capture: CaptureSettings,
    /// OCR settings
    pub ocr: OcrSettings,
    /// Translation settings
    pub translation: TranslationSettings,
    /// Pipeline timing
    pub pipeline: PipelineSettings,
    /// Overlay settings
    pub overlay: OverlaySettings,
}

/// Capture-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Source to capture when none is given on the command line
    pub default_source: Option<String>,
    /// Grab rate of the capture thread
    pub max_fps: u32,
    /// Longest side of source thumbnails
    pub thumbnail_size: u32,
    /// Serve image files from this directory instead of the screen
    pub image_dir: Option<PathBuf>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            default_source: None,
            max_fps: 2,
            thumbnail_size: 300,
            image_dir: None,
        }
    }
}

/// OCR settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// OCR backend to use
    pub backend: OcrBackend,
    /// Word or line level regions
    pub granularity: OcrGranularity,
    /// Engine language code (`eng`, `jpn`, `jpn+eng`, or a BCP-47 tag for Windows OCR)
    pub language: String,
    /// Directory holding `*.traineddata` files
    pub tessdata_dir: Option<PathBuf>,
    /// Detections at or below this confidence are dropped
    pub min_confidence: f32,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            backend: OcrBackend::default(),
            granularity: OcrGranularity::default(),
            language: "eng".to_string(),
            tessdata_dir: None,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

/// Translation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationSettings {
    /// Translation backend to use
    pub backend: TranslationBackend,
    /// HTTP endpoint for the libre_translate backend
    pub endpoint: Option<String>,
    /// API key for the libre_translate backend
    pub api_key: Option<String>,
    pub source_language: String,
    pub target_language: String,
    /// Prefix used by the tagging backend
    pub tag: String,
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            backend: TranslationBackend::default(),
            endpoint: None,
            api_key: None,
            source_language: "auto".to_string(),
            target_language: "en".to_string(),
            tag: "[JP]".to_string(),
        }
    }
}

/// Pipeline timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Period between pipeline passes
    pub tick_interval_ms: u64,
    /// Upper bound on a single recognition or translation call
    pub stage_timeout_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            stage_timeout_ms: 10_000,
        }
    }
}

/// Overlay-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    /// Label background opacity
    pub opacity: f32,
    /// Label font size in points
    pub font_size: f32,
    /// Show the recognized text under the translation
    pub show_caption: bool,
    /// Monitor to display overlay on
    pub monitor_index: Option<usize>,
    /// Let mouse input pass through the overlay
    pub click_through: bool,
    /// Offset added to every label position
    pub offset: (i32, i32),
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            opacity: 0.7,
            font_size: 18.0,
            show_caption: false,
            monitor_index: None,
            click_through: true,
            offset: (0, 0),
        }
    }
}

/// Get the configuration directory
pub fn config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "yakumon", "Yakumon")
        .context("Could not determine config directory")?;
    Ok(proj_dirs.config_dir().to_path_buf())
}

/// Default location of the configuration file
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: AppConfig =
        toml::from_str(&content).with_context(|| format!("Invalid config {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        assert!(config.capture.default_source.is_none());
        assert_eq!(config.capture.thumbnail_size, 300);

        assert_eq!(config.ocr.backend, OcrBackend::Tesseract);
        assert_eq!(config.ocr.language, "eng");
        assert!((config.ocr.min_confidence - 70.0).abs() < f32::EPSILON);

        assert_eq!(config.translation.backend, TranslationBackend::Tagging);
        assert_eq!(config.translation.tag, "[JP]");

        assert_eq!(config.pipeline.tick_interval_ms, 500);

        assert!(config.overlay.click_through);
        assert!(!config.overlay.show_caption);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.pipeline.tick_interval_ms, parsed.pipeline.tick_interval_ms);
        assert_eq!(config.ocr.language, parsed.ocr.language);
        assert_eq!(config.overlay.offset, parsed.overlay.offset);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [ocr]
            language = "jpn"
            granularity = "line"

            [translation]
            backend = "libre_translate"
            endpoint = "http://localhost:5000/translate"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.ocr.language, "jpn");
        assert_eq!(parsed.ocr.granularity, OcrGranularity::Line);
        assert_eq!(parsed.ocr.backend, OcrBackend::Tesseract);
        assert_eq!(parsed.translation.backend, TranslationBackend::LibreTranslate);
        assert_eq!(parsed.translation.target_language, "en");
        assert_eq!(parsed.pipeline.tick_interval_ms, 500);
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = AppConfig::default();
        config.capture.default_source = Some("screen:1".to_string());
        config.pipeline.tick_interval_ms = 250;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        save_config(&config, &path).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.capture.default_source.as_deref(), Some("screen:1"));
        assert_eq!(loaded.pipeline.tick_interval_ms, 250);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}
