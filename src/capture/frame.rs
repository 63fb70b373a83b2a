//! Frame data structures for captured screen content

use image::{ImageFormat, RgbaImage};
use parking_lot::Mutex;
use std::io::Cursor;
use std::sync::Arc;

use super::CaptureError;

/// A captured frame from the screen
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw RGBA pixel data
    data: Arc<[u8]>,
    /// Frame width in pixels
    width: u32,
    /// Frame height in pixels
    height: u32,
}

impl Frame {
    /// Create a new frame from tightly packed RGBA data.
    ///
    /// Returns `None` when either dimension is zero or the buffer does not
    /// hold exactly `width * height` pixels.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        if data.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            data: data.into(),
            width,
            height,
        })
    }

    /// Wrap a decoded RGBA image
    pub fn from_image(image: RgbaImage) -> Option<Self> {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height)
    }

    /// Raw RGBA bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Copy the pixels into an owned image buffer
    pub fn to_image(&self) -> RgbaImage {
        // Length was validated in `new`, so this cannot fail.
        RgbaImage::from_raw(self.width, self.height, self.data.to_vec())
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }

    /// Encode the frame as PNG bytes for engines that consume files
    pub fn encode_png(&self) -> Result<Vec<u8>, CaptureError> {
        let mut out = Cursor::new(Vec::new());
        self.to_image()
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|e| CaptureError::DecodeFailure(format!("PNG encode failed: {}", e)))?;
        Ok(out.into_inner())
    }
}

/// Single-slot, latest-wins hand-off between a grabber and the pipeline.
///
/// The grabber overwrites whatever is in the slot; readers get a clone of the
/// newest frame, which stays in place until the next grab replaces it. There
/// is never a backlog.
#[derive(Debug, Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<SlotState>>,
}

#[derive(Debug, Default)]
struct SlotState {
    frame: Option<Frame>,
    /// Fatal error reported by the producer
    fault: Option<CaptureError>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new frame, replacing the previous one
    pub fn put(&self, frame: Frame) {
        self.inner.lock().frame = Some(frame);
    }

    /// The newest frame, if the producer has delivered one
    pub fn latest(&self) -> Option<Frame> {
        self.inner.lock().frame.clone()
    }

    /// Record a producer failure that ends the stream
    pub fn fail(&self, error: CaptureError) {
        let mut state = self.inner.lock();
        state.frame = None;
        state.fault = Some(error);
    }

    /// The producer's fatal error, if any
    pub fn fault(&self) -> Option<CaptureError> {
        self.inner.lock().fault.clone()
    }
}
