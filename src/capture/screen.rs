//! Live monitor and window capture via xcap
//!
//! Source ids are `screen:<monitor id>` and `window:<window id>`. The grabber
//! re-resolves the target on every grab so a closed window or unplugged
//! monitor ends the stream with `SourceUnavailable`.

use tracing::{debug, info};
use xcap::{Monitor, Window};

use super::{
    make_thumbnail, CaptureBackend, CaptureError, CaptureStream, Frame, FrameSlot, Grabber,
    GrabResult, SlotStream, Source, SourceId, SourceKind, ENTIRE_SCREEN,
};

/// Screen/window capture backend
pub struct ScreenBackend {
    max_fps: u32,
    thumbnail_size: u32,
}

impl ScreenBackend {
    pub fn new(max_fps: u32, thumbnail_size: u32) -> Self {
        Self {
            max_fps,
            thumbnail_size,
        }
    }

    fn monitor_sources(&self) -> Result<Vec<Source>, CaptureError> {
        let monitors = Monitor::all().map_err(|e| CaptureError::PermissionDenied(e.to_string()))?;
        let single = monitors.len() == 1;

        let mut sources = Vec::with_capacity(monitors.len());
        for (index, monitor) in monitors.iter().enumerate() {
            let Ok(id) = monitor.id() else { continue };
            let name = if single {
                ENTIRE_SCREEN.to_string()
            } else {
                format!("Screen {}", index + 1)
            };

            let mut source = Source::new(SourceId::new(format!("screen:{}", id)), name);
            match monitor.capture_image() {
                Ok(image) => source = source.with_thumbnail(make_thumbnail(&image, self.thumbnail_size)),
                Err(e) => debug!("No thumbnail for monitor {}: {}", id, e),
            }
            sources.push(source);
        }
        Ok(sources)
    }

    fn window_sources(&self) -> Result<Vec<Source>, CaptureError> {
        let windows = Window::all().map_err(|e| CaptureError::PermissionDenied(e.to_string()))?;

        let mut sources = Vec::new();
        for window in windows {
            if window.is_minimized().unwrap_or(false) {
                continue;
            }
            let title = window.title().unwrap_or_default();
            if title.trim().is_empty() {
                continue;
            }
            let Ok(id) = window.id() else { continue };

            let mut source = Source::new(SourceId::new(format!("window:{}", id)), title);
            match window.capture_image() {
                Ok(image) => source = source.with_thumbnail(make_thumbnail(&image, self.thumbnail_size)),
                Err(e) => debug!("No thumbnail for window {}: {}", id, e),
            }
            sources.push(source);
        }
        Ok(sources)
    }
}

impl CaptureBackend for ScreenBackend {
    fn name(&self) -> &'static str {
        "screen"
    }

    fn list_sources(&self) -> Result<Vec<Source>, CaptureError> {
        let mut sources = self.monitor_sources()?;
        sources.extend(self.window_sources()?);
        info!("Enumerated {} capture sources", sources.len());
        Ok(sources)
    }

    fn open(&self, source_id: &SourceId) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let target = Target::parse(source_id)?;

        // A failed first grab on an existing source is almost always a
        // missing screen-recording permission.
        let first = match target.grab() {
            Err(CaptureError::DecodeFailure(reason)) => {
                return Err(CaptureError::PermissionDenied(reason))
            }
            other => other?,
        };

        let slot = FrameSlot::new();
        if let Some(frame) = Frame::from_image(first) {
            slot.put(frame);
        }

        let grabber = Grabber::spawn(source_id.to_string(), self.max_fps, slot.clone(), move || {
            target.grab()
        });
        Ok(Box::new(SlotStream::new(slot, grabber)))
    }
}

/// Resolved capture target
#[derive(Debug, Clone, Copy)]
enum Target {
    Monitor(u32),
    Window(u32),
}

impl Target {
    fn parse(source_id: &SourceId) -> Result<Self, CaptureError> {
        let unavailable = || CaptureError::SourceUnavailable(source_id.to_string());
        let id: u32 = source_id.local_part().parse().map_err(|_| unavailable())?;
        match source_id.kind() {
            Some(SourceKind::Screen) => Ok(Target::Monitor(id)),
            Some(SourceKind::Window) => Ok(Target::Window(id)),
            _ => Err(unavailable()),
        }
    }

    fn grab(&self) -> GrabResult {
        match *self {
            Target::Monitor(id) => {
                let monitors =
                    Monitor::all().map_err(|e| CaptureError::DecodeFailure(e.to_string()))?;
                let monitor = monitors
                    .into_iter()
                    .find(|m| m.id().ok() == Some(id))
                    .ok_or_else(|| CaptureError::SourceUnavailable(format!("screen:{}", id)))?;
                monitor
                    .capture_image()
                    .map_err(|e| CaptureError::DecodeFailure(e.to_string()))
            }
            Target::Window(id) => {
                let windows =
                    Window::all().map_err(|e| CaptureError::DecodeFailure(e.to_string()))?;
                let window = windows
                    .into_iter()
                    .find(|w| w.id().ok() == Some(id))
                    .ok_or_else(|| CaptureError::SourceUnavailable(format!("window:{}", id)))?;
                window
                    .capture_image()
                    .map_err(|e| CaptureError::DecodeFailure(e.to_string()))
            }
        }
    }
}
