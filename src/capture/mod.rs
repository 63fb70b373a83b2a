//! Screen Capture Layer
//!
//! Enumerates capturable sources and owns the live capture stream for the
//! selected one. Backends push decoded frames into a single-slot mailbox from
//! a grabber thread; the pipeline only ever sees the most recent frame.

pub mod frame;
#[cfg(feature = "screen-capture")]
pub mod screen;
pub mod still;

use base64::Engine as _;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use frame::{Frame, FrameSlot};

/// Name the default-source rule looks for first
pub const ENTIRE_SCREEN: &str = "Entire Screen";

/// Errors raised while opening or running a capture stream
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("capture source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("capture permission denied: {0}")]
    PermissionDenied(String),
    #[error("frame decode failed: {0}")]
    DecodeFailure(String),
    #[error("no capture sources available")]
    NoSources,
}

/// Identifier of a capturable screen, window or file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Kind inferred from the `kind:` prefix
    pub fn kind(&self) -> Option<SourceKind> {
        let (prefix, _) = self.0.split_once(':')?;
        match prefix {
            "screen" => Some(SourceKind::Screen),
            "window" => Some(SourceKind::Window),
            "file" => Some(SourceKind::File),
            _ => None,
        }
    }

    /// The part after the `kind:` prefix
    pub fn local_part(&self) -> &str {
        self.0.split_once(':').map(|(_, rest)| rest).unwrap_or(&self.0)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// What a source captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Screen,
    Window,
    File,
}

/// A capturable screen or window as enumerated by a backend
#[derive(Debug, Clone)]
pub struct Source {
    pub id: SourceId,
    /// Human-readable label
    pub name: String,
    /// Preview image, bounded to the configured thumbnail size
    pub thumbnail: Option<RgbaImage>,
}

impl Source {
    pub fn new(id: SourceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            thumbnail: None,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: RgbaImage) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    /// Thumbnail as a `data:image/png;base64,...` URL
    pub fn thumbnail_data_url(&self) -> Option<String> {
        let thumbnail = self.thumbnail.as_ref()?;
        let frame = Frame::from_image(thumbnail.clone())?;
        let png = frame.encode_png().ok()?;
        Some(format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        ))
    }
}

/// Pick the source to capture when the user did not choose one:
/// "Entire Screen" if present, otherwise the first source.
pub fn select_default_source(sources: &[Source]) -> Option<&Source> {
    sources
        .iter()
        .find(|s| s.name == ENTIRE_SCREEN)
        .or_else(|| sources.first())
}

/// Shrink an image to fit in a `max_side` square, keeping aspect ratio
pub fn make_thumbnail(image: &RgbaImage, max_side: u32) -> RgbaImage {
    let (width, height) = image.dimensions();
    if width <= max_side && height <= max_side {
        return image.clone();
    }
    let scale = max_side as f32 / width.max(height) as f32;
    let new_width = ((width as f32 * scale).round() as u32).max(1);
    let new_height = ((height as f32 * scale).round() as u32).max(1);
    image::imageops::thumbnail(image, new_width, new_height)
}

/// A source of capturable screens/windows
pub trait CaptureBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Enumerate the sources that can be captured right now
    fn list_sources(&self) -> Result<Vec<Source>, CaptureError>;

    /// Open a live stream bound to `source_id`
    fn open(&self, source_id: &SourceId) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

/// A live capture stream. Dropping it releases every capture resource.
pub trait CaptureStream: Send {
    /// The most recent frame, if one has been decoded yet. Never blocks.
    fn latest_frame(&mut self) -> Option<Frame>;

    /// Fatal stream error, if the stream has died
    fn health(&self) -> Result<(), CaptureError>;
}

/// Owns the capture stream for the active source
pub struct FrameSource {
    backend: Arc<dyn CaptureBackend>,
    stream: Option<(SourceId, Box<dyn CaptureStream>)>,
}

impl FrameSource {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            stream: None,
        }
    }

    /// Backend the streams are opened on
    pub fn backend(&self) -> Arc<dyn CaptureBackend> {
        self.backend.clone()
    }

    /// Open a stream on `source_id`, closing any stream already open
    pub fn open(&mut self, source_id: &SourceId) -> Result<(), CaptureError> {
        self.close();

        let stream = self.backend.open(source_id)?;
        info!("Capture stream opened on {} ({})", source_id, self.backend.name());
        self.stream = Some((source_id.clone(), stream));
        Ok(())
    }

    /// Latest decoded frame, or `None` while the stream has produced nothing
    pub fn capture_frame(&mut self) -> Option<Frame> {
        let (_, stream) = self.stream.as_mut()?;
        stream.latest_frame()
    }

    /// Fatal error of the open stream. A closed source is healthy.
    pub fn health(&self) -> Result<(), CaptureError> {
        match &self.stream {
            Some((_, stream)) => stream.health(),
            None => Ok(()),
        }
    }

    /// Release the stream. No-op when already closed.
    pub fn close(&mut self) {
        if let Some((source_id, stream)) = self.stream.take() {
            drop(stream);
            info!("Capture stream closed on {}", source_id);
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Wait between grabs at `max_fps`, never shorter than a millisecond
fn grab_period(max_fps: u32) -> Duration {
    Duration::from_millis((1000 / u64::from(max_fps.max(1))).max(1))
}

/// Outcome of one grab attempt on a grabber thread
pub(crate) type GrabResult = Result<RgbaImage, CaptureError>;

/// Background thread that grabs frames at a fixed rate into a [`FrameSlot`].
///
/// `DecodeFailure` is treated as transient; any other error ends the thread
/// and is recorded on the slot.
pub(crate) struct Grabber {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Grabber {
    pub(crate) fn spawn<F>(label: String, max_fps: u32, slot: FrameSlot, mut grab: F) -> Self
    where
        F: FnMut() -> GrabResult + Send + 'static,
    {
        let period = grab_period(max_fps);
        let (stop, stop_rx) = bounded::<()>(1);

        let handle = std::thread::spawn(move || {
            debug!("Grabber for {} started ({:?} period)", label, period);
            loop {
                match grab() {
                    Ok(image) => match Frame::from_image(image) {
                        Some(frame) => slot.put(frame),
                        None => debug!("Grabber for {} produced an empty frame", label),
                    },
                    Err(CaptureError::DecodeFailure(reason)) => {
                        warn!("Grab failed on {}: {}", label, reason);
                    }
                    Err(e) => {
                        warn!("Capture stream on {} ended: {}", label, e);
                        slot.fail(e);
                        break;
                    }
                }

                match stop_rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    _ => break,
                }
            }
            debug!("Grabber for {} exiting", label);
        });

        Self {
            stop: Some(stop),
            handle: Some(handle),
        }
    }
}

impl Drop for Grabber {
    fn drop(&mut self) {
        // Disconnecting the channel wakes the thread out of its wait.
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Stream fed by a [`Grabber`] thread
pub(crate) struct SlotStream {
    slot: FrameSlot,
    _grabber: Grabber,
}

impl SlotStream {
    pub(crate) fn new(slot: FrameSlot, grabber: Grabber) -> Self {
        Self {
            slot,
            _grabber: grabber,
        }
    }
}

impl CaptureStream for SlotStream {
    fn latest_frame(&mut self) -> Option<Frame> {
        self.slot.latest()
    }

    fn health(&self) -> Result<(), CaptureError> {
        match self.slot.fault() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeBackend;
    use super::*;

    #[test]
    fn test_default_source_prefers_entire_screen() {
        let sources = vec![
            Source::new("window:1".into(), "Editor"),
            Source::new("screen:0".into(), ENTIRE_SCREEN),
        ];
        let chosen = select_default_source(&sources).unwrap();
        assert_eq!(chosen.id.as_str(), "screen:0");
    }

    #[test]
    fn test_default_source_falls_back_to_first() {
        let sources = vec![
            Source::new("window:1".into(), "Editor"),
            Source::new("window:2".into(), "Browser"),
        ];
        assert_eq!(select_default_source(&sources).unwrap().id.as_str(), "window:1");
        assert!(select_default_source(&[]).is_none());
    }

    #[test]
    fn test_source_id_kind() {
        assert_eq!(SourceId::from("screen:3").kind(), Some(SourceKind::Screen));
        assert_eq!(SourceId::from("window:42").kind(), Some(SourceKind::Window));
        assert_eq!(SourceId::from("file:a.png").local_part(), "a.png");
        assert_eq!(SourceId::from("bogus").kind(), None);
    }

    #[test]
    fn test_thumbnail_keeps_aspect_ratio() {
        let image = RgbaImage::new(1920, 1080);
        let thumb = make_thumbnail(&image, 300);
        assert_eq!(thumb.dimensions(), (300, 169));

        let small = RgbaImage::new(100, 50);
        assert_eq!(make_thumbnail(&small, 300).dimensions(), (100, 50));
    }

    #[test]
    fn test_thumbnail_data_url() {
        let source = Source::new("screen:0".into(), "Screen").with_thumbnail(RgbaImage::new(4, 4));
        let url = source.thumbnail_data_url().unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
        assert!(Source::new("screen:1".into(), "x").thumbnail_data_url().is_none());
    }

    #[test]
    fn test_open_closes_previous_stream() {
        let backend = Arc::new(FakeBackend::with_sources(&[("s1", "One"), ("s2", "Two")]));
        let mut source = FrameSource::new(backend.clone());

        source.open(&"s1".into()).unwrap();
        source.open(&"s2".into()).unwrap();

        assert_eq!(*backend.live_streams.lock(), 1);
        assert_eq!(*backend.opened.lock(), vec![SourceId::from("s1"), SourceId::from("s2")]);
    }

    #[test]
    fn test_open_unknown_source_fails() {
        let backend = Arc::new(FakeBackend::with_sources(&[("s1", "One")]));
        let mut source = FrameSource::new(backend.clone());

        let result = source.open(&"missing".into());
        assert!(matches!(result, Err(CaptureError::SourceUnavailable(_))));
        assert_eq!(*backend.live_streams.lock(), 0);
        assert!(source.capture_frame().is_none());
    }

    #[test]
    fn test_close_is_idempotent() {
        let backend = Arc::new(FakeBackend::with_sources(&[("s1", "One")]));
        let mut source = FrameSource::new(backend.clone());

        source.close();
        source.open(&"s1".into()).unwrap();
        source.close();
        source.close();

        assert_eq!(*backend.live_streams.lock(), 0);
        assert!(source.capture_frame().is_none());
    }

    #[test]
    fn test_capture_frame_returns_latest() {
        let backend = Arc::new(FakeBackend::with_sources(&[("s1", "One")]));
        let mut source = FrameSource::new(backend.clone());
        source.open(&"s1".into()).unwrap();

        assert!(source.capture_frame().is_none());
        backend.push_frame(10, 10);
        backend.push_frame(20, 10);

        assert_eq!(source.capture_frame().unwrap().dimensions(), (20, 10));
        // A ready stream keeps answering until the next grab lands
        assert_eq!(source.capture_frame().unwrap().dimensions(), (20, 10));

        backend.push_frame(30, 10);
        assert_eq!(source.capture_frame().unwrap().dimensions(), (30, 10));
    }

    #[test]
    fn test_grab_period_is_never_zero() {
        assert_eq!(grab_period(0), Duration::from_millis(1000));
        assert_eq!(grab_period(2), Duration::from_millis(500));
        assert_eq!(grab_period(1000), Duration::from_millis(1));
        assert_eq!(grab_period(5000), Duration::from_millis(1));
    }

    #[test]
    fn test_grabber_fills_slot_and_stops() {
        let slot = FrameSlot::new();
        let grabber = Grabber::spawn("test".into(), 50, slot.clone(), || Ok(RgbaImage::new(8, 8)));

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while slot.latest().is_none() {
            assert!(std::time::Instant::now() < deadline, "grabber never produced a frame");
            std::thread::sleep(Duration::from_millis(5));
        }
        drop(grabber);
    }

    #[test]
    fn test_grabber_records_fatal_error() {
        let slot = FrameSlot::new();
        let stream = SlotStream::new(
            slot.clone(),
            Grabber::spawn("gone".into(), 50, slot.clone(), || {
                Err(CaptureError::SourceUnavailable("window closed".into()))
            }),
        );

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while stream.health().is_ok() {
            assert!(std::time::Instant::now() < deadline, "fault never recorded");
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(matches!(stream.health(), Err(CaptureError::SourceUnavailable(_))));
    }
}
