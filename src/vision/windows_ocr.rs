//! Windows OCR API backend
//!
//! Uses the built-in Windows OCR (Media.Ocr). The platform reports no
//! per-word confidence, so every detection is given full confidence.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use windows::{
    core::HSTRING,
    Globalization::Language,
    Graphics::Imaging::{BitmapPixelFormat, SoftwareBitmap},
    Media::Ocr::{OcrEngine as WinOcrEngine, OcrResult as WinOcrResult},
    Storage::Streams::{DataReader, DataWriter, InMemoryRandomAccessStream},
};

use super::{
    group_into_lines, BoundingBox, LanguageAssets, OcrCandidate, OcrEngine, OcrError,
    OcrGranularity,
};
use crate::capture::Frame;

/// Confidence reported for every Windows OCR word
const PLATFORM_CONFIDENCE: f32 = 100.0;

/// Windows OCR engine wrapper
pub struct WindowsOcr {
    engine: Mutex<Option<WinOcrEngine>>,
    granularity: OcrGranularity,
}

impl WindowsOcr {
    pub fn new(granularity: OcrGranularity) -> Self {
        Self {
            engine: Mutex::new(None),
            granularity,
        }
    }

    /// Get available OCR languages on this system
    pub fn available_languages() -> windows::core::Result<Vec<String>> {
        let languages = WinOcrEngine::AvailableRecognizerLanguages()?;
        let mut result = Vec::new();
        for i in 0..languages.Size()? {
            if let Ok(tag) = languages.GetAt(i).and_then(|lang| lang.LanguageTag()) {
                result.push(tag.to_string());
            }
        }
        Ok(result)
    }
}

#[async_trait]
impl OcrEngine for WindowsOcr {
    fn name(&self) -> &'static str {
        "windows"
    }

    async fn load(&self, assets: &LanguageAssets) -> Result<(), OcrError> {
        let tag = assets.language.clone();
        let engine = tokio::task::spawn_blocking(move || create_engine(&tag))
            .await
            .map_err(|e| OcrError::AssetLoadFailed(e.to_string()))??;
        *self.engine.lock() = Some(engine);
        Ok(())
    }

    async fn detect(&self, frame: &Frame) -> Result<Vec<OcrCandidate>, OcrError> {
        let engine = self.engine.lock().clone().ok_or(OcrError::NotInitialized)?;
        let frame = frame.clone();
        let granularity = self.granularity;

        tokio::task::spawn_blocking(move || {
            let bitmap = create_software_bitmap(&rgba_to_bgra(frame.data()), frame.width(), frame.height())
                .map_err(engine_failure)?;
            let result = engine
                .RecognizeAsync(&bitmap)
                .and_then(|op| op.get())
                .map_err(engine_failure)?;
            let words = extract_words(&result).map_err(engine_failure)?;
            debug!("Windows OCR: found {} words", words.len());
            Ok(match granularity {
                OcrGranularity::Word => words.into_iter().map(|(_, word)| word).collect(),
                OcrGranularity::Line => group_into_lines(words),
            })
        })
        .await
        .map_err(|e| OcrError::EngineFailure(e.to_string()))?
    }

    async fn unload(&self) {
        self.engine.lock().take();
    }
}

fn engine_failure(error: windows::core::Error) -> OcrError {
    OcrError::EngineFailure(error.message().to_string())
}

fn create_engine(language_tag: &str) -> Result<WinOcrEngine, OcrError> {
    let asset_error = |e: windows::core::Error| OcrError::AssetLoadFailed(e.message().to_string());

    let language = Language::CreateLanguage(&HSTRING::from(language_tag)).map_err(asset_error)?;
    if !WinOcrEngine::IsLanguageSupported(&language).map_err(asset_error)? {
        let installed = WindowsOcr::available_languages().unwrap_or_default();
        return Err(OcrError::AssetLoadFailed(format!(
            "OCR language '{}' is not installed (available: {})",
            language_tag,
            installed.join(", ")
        )));
    }
    WinOcrEngine::TryCreateFromLanguage(&language).map_err(asset_error)
}

/// Convert RGBA to BGRA (Windows expects BGRA)
fn rgba_to_bgra(rgba: &[u8]) -> Vec<u8> {
    let mut bgra = rgba.to_vec();
    for chunk in bgra.chunks_exact_mut(4) {
        chunk.swap(0, 2);
    }
    bgra
}

/// Create a SoftwareBitmap from BGRA data using CopyFromBuffer
fn create_software_bitmap(
    bgra_data: &[u8],
    width: u32,
    height: u32,
) -> windows::core::Result<SoftwareBitmap> {
    let stream = InMemoryRandomAccessStream::new()?;
    let writer = DataWriter::CreateDataWriter(&stream)?;
    writer.WriteBytes(bgra_data)?;
    writer.StoreAsync()?.get()?;
    writer.FlushAsync()?.get()?;

    let bitmap = SoftwareBitmap::Create(BitmapPixelFormat::Bgra8, width as i32, height as i32)?;

    let reader = DataReader::CreateDataReader(&stream.GetInputStreamAt(0)?)?;
    reader.LoadAsync(bgra_data.len() as u32)?.get()?;
    let buffer = reader.ReadBuffer(bgra_data.len() as u32)?;
    bitmap.CopyFromBuffer(&buffer)?;

    Ok(bitmap)
}

/// Words with the index of the line they belong to
fn extract_words(ocr_result: &WinOcrResult) -> windows::core::Result<Vec<(u32, OcrCandidate)>> {
    let mut words_out = Vec::new();
    let lines = ocr_result.Lines()?;

    for i in 0..lines.Size()? {
        let words = lines.GetAt(i)?.Words()?;
        for j in 0..words.Size()? {
            let word = words.GetAt(j)?;
            let rect = word.BoundingRect()?;
            words_out.push((
                i,
                OcrCandidate {
                    text: word.Text()?.to_string(),
                    bbox: BoundingBox::from_xywh(
                        rect.X.max(0.0) as u32,
                        rect.Y.max(0.0) as u32,
                        rect.Width.max(0.0) as u32,
                        rect.Height.max(0.0) as u32,
                    ),
                    confidence: PLATFORM_CONFIDENCE,
                },
            ));
        }
    }

    Ok(words_out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba_to_bgra_swaps_channels() {
        assert_eq!(rgba_to_bgra(&[1, 2, 3, 4, 5, 6, 7, 8]), vec![3, 2, 1, 4, 7, 6, 5, 8]);
    }

    #[test]
    fn test_available_languages() {
        let languages = WindowsOcr::available_languages();
        assert!(languages.is_ok());
    }
}
