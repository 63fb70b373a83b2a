//! Label geometry and styling for the translation overlay

use serde::Serialize;

use crate::translate::TranslatedRegion;
use crate::vision::BoundingBox;

/// Smallest font size a label is shrunk to
const MIN_FONT_SIZE: f32 = 8.0;

/// Style configuration for label widgets
#[derive(Debug, Clone)]
pub struct LabelStyle {
    /// Background color (RGBA)
    pub background: [f32; 4],
    /// Text color (RGBA)
    pub text_color: [f32; 4],
    /// Caption color (RGBA)
    pub caption_color: [f32; 4],
    /// Border color (RGBA)
    pub border_color: [f32; 4],
    /// Border radius
    pub corner_radius: f32,
}

impl Default for LabelStyle {
    fn default() -> Self {
        Self {
            background: [0.0, 0.0, 0.0, 0.7],
            text_color: [1.0, 1.0, 1.0, 1.0],
            caption_color: [0.75, 0.75, 0.75, 1.0],
            border_color: [0.2, 0.2, 0.2, 1.0],
            corner_radius: 2.0,
        }
    }
}

impl LabelStyle {
    /// Default style with the background alpha replaced
    pub fn with_opacity(opacity: f32) -> Self {
        let mut style = Self::default();
        style.background[3] = opacity.clamp(0.0, 1.0);
        style
    }
}

/// Screen-space rectangle of a label
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LabelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One positioned, non-interactive label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayLabel {
    pub rect: LabelRect,
    /// Translated text
    pub text: String,
    /// Recognized source text, when captions are enabled
    pub caption: Option<String>,
    pub font_size: f32,
}

/// Maps region boxes to label rectangles
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelLayout {
    pub offset: (i32, i32),
    pub font_size: f32,
    pub show_caption: bool,
}

impl Default for LabelLayout {
    fn default() -> Self {
        Self {
            offset: (0, 0),
            font_size: 18.0,
            show_caption: false,
        }
    }
}

impl LabelLayout {
    /// Rectangle for a box, or `None` for zero-area boxes
    pub fn rect_for(&self, bbox: &BoundingBox) -> Option<LabelRect> {
        if bbox.is_empty() {
            return None;
        }
        Some(LabelRect {
            x: bbox.x0 as f32 + self.offset.0 as f32,
            y: bbox.y0 as f32 + self.offset.1 as f32,
            width: bbox.width() as f32,
            height: bbox.height() as f32,
        })
    }

    /// Font size that fits the label height
    pub fn font_size_for(&self, rect: &LabelRect) -> f32 {
        let lines = if self.show_caption { 2.0 } else { 1.0 };
        let fitted = rect.height * 0.8 / lines;
        self.font_size.min(fitted).max(MIN_FONT_SIZE)
    }

    /// Lay out every visible region, in input order
    pub fn layout(&self, regions: &[TranslatedRegion]) -> Vec<OverlayLabel> {
        regions
            .iter()
            .filter_map(|region| {
                let rect = self.rect_for(&region.bbox)?;
                Some(OverlayLabel {
                    rect,
                    text: region.translated.clone(),
                    caption: self.show_caption.then(|| region.text.clone()),
                    font_size: self.font_size_for(&rect),
                })
            })
            .collect()
    }
}
