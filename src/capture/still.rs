//! Still-image capture backend
//!
//! Treats every image file in a directory as a capturable source. The file is
//! re-decoded on every grab, so replacing it on disk changes what the
//! pipeline sees. Useful for headless runs and demos.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{
    make_thumbnail, CaptureBackend, CaptureError, CaptureStream, FrameSlot, Grabber, GrabResult,
    SlotStream, Source, SourceId, SourceKind,
};

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Backend serving image files from one directory
pub struct StillImageBackend {
    dir: PathBuf,
    max_fps: u32,
    thumbnail_size: u32,
}

impl StillImageBackend {
    pub fn new(dir: impl Into<PathBuf>, max_fps: u32, thumbnail_size: u32) -> Self {
        Self {
            dir: dir.into(),
            max_fps,
            thumbnail_size,
        }
    }

    fn image_files(&self) -> Result<Vec<PathBuf>, CaptureError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| io_error(&self.dir, e))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_image_extension(path))
            .collect();
        files.sort();
        Ok(files)
    }

    fn path_for(&self, source_id: &SourceId) -> Result<PathBuf, CaptureError> {
        if source_id.kind() != Some(SourceKind::File) {
            return Err(CaptureError::SourceUnavailable(format!(
                "{} is not a file source",
                source_id
            )));
        }
        let name = source_id.local_part();
        // Only bare file names inside the directory are addressable.
        if name.is_empty() || Path::new(name).components().count() != 1 {
            return Err(CaptureError::SourceUnavailable(source_id.to_string()));
        }
        Ok(self.dir.join(name))
    }
}

impl CaptureBackend for StillImageBackend {
    fn name(&self) -> &'static str {
        "still-image"
    }

    fn list_sources(&self) -> Result<Vec<Source>, CaptureError> {
        let mut sources = Vec::new();
        for path in self.image_files()? {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let label = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(file_name)
                .to_string();

            let mut source = Source::new(SourceId::new(format!("file:{}", file_name)), label);
            match load_image(&path) {
                Ok(image) => source = source.with_thumbnail(make_thumbnail(&image, self.thumbnail_size)),
                Err(e) => debug!("No thumbnail for {:?}: {}", path, e),
            }
            sources.push(source);
        }
        Ok(sources)
    }

    fn open(&self, source_id: &SourceId) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let path = self.path_for(source_id)?;
        // Surface missing files and permission problems at open time.
        let first = load_image(&path)?;

        let slot = FrameSlot::new();
        if let Some(frame) = super::Frame::from_image(first) {
            slot.put(frame);
        }

        let grabber = Grabber::spawn(source_id.to_string(), self.max_fps, slot.clone(), move || {
            load_image(&path)
        });
        Ok(Box::new(SlotStream::new(slot, grabber)))
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn load_image(path: &Path) -> GrabResult {
    let bytes = std::fs::read(path).map_err(|e| io_error(path, e))?;
    let image = image::load_from_memory(&bytes)
        .map_err(|e| CaptureError::DecodeFailure(format!("{:?}: {}", path, e)))?;
    Ok(image.to_rgba8())
}

fn io_error(path: &Path, error: std::io::Error) -> CaptureError {
    match error.kind() {
        ErrorKind::PermissionDenied => CaptureError::PermissionDenied(format!("{:?}", path)),
        ErrorKind::NotFound => CaptureError::SourceUnavailable(format!("{:?}", path)),
        _ => CaptureError::DecodeFailure(format!("{:?}: {}", path, error)),
    }
}

/// Write an image to disk; used by tests that need a source file.
#[cfg(test)]
pub(crate) fn write_test_image(path: &Path, width: u32, height: u32) {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 10, 10, 255]));
    image.save(path).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    #[test]
    fn test_lists_only_image_files() {
        let dir = TempDir::new().unwrap();
        write_test_image(&dir.path().join("b.png"), 40, 20);
        write_test_image(&dir.path().join("a.png"), 10, 10);
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();

        let backend = StillImageBackend::new(dir.path(), 2, 16);
        let sources = backend.list_sources().unwrap();

        let ids: Vec<&str> = sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["file:a.png", "file:b.png"]);
        assert_eq!(sources[1].name, "b");
        assert_eq!(sources[1].thumbnail.as_ref().unwrap().dimensions(), (16, 8));
    }

    #[test]
    fn test_missing_directory_is_unavailable() {
        let backend = StillImageBackend::new("/nonexistent/yakumon/frames", 2, 16);
        assert!(matches!(backend.list_sources(), Err(CaptureError::SourceUnavailable(_))));
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let backend = StillImageBackend::new(dir.path(), 2, 16);

        let result = backend.open(&"file:nope.png".into());
        assert!(matches!(result, Err(CaptureError::SourceUnavailable(_))));
    }

    #[test]
    fn test_rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let backend = StillImageBackend::new(dir.path(), 2, 16);

        assert!(backend.open(&"file:../etc/passwd".into()).is_err());
        assert!(backend.open(&"screen:0".into()).is_err());
    }

    #[test]
    fn test_stream_yields_first_frame_immediately() {
        let dir = TempDir::new().unwrap();
        write_test_image(&dir.path().join("shot.png"), 32, 24);

        let backend = StillImageBackend::new(dir.path(), 2, 16);
        let mut stream = backend.open(&"file:shot.png".into()).unwrap();

        let frame = stream.latest_frame().unwrap();
        assert_eq!(frame.dimensions(), (32, 24));
        assert!(stream.health().is_ok());
    }

    #[test]
    fn test_stream_repeats_frame_between_grabs() {
        let dir = TempDir::new().unwrap();
        write_test_image(&dir.path().join("shot.png"), 32, 24);

        // One grab every second; both reads land before the second grab
        let backend = StillImageBackend::new(dir.path(), 1, 16);
        let mut stream = backend.open(&"file:shot.png".into()).unwrap();

        assert_eq!(stream.latest_frame().unwrap().dimensions(), (32, 24));
        assert_eq!(stream.latest_frame().unwrap().dimensions(), (32, 24));
    }

    #[test]
    fn test_stream_fails_when_file_removed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shot.png");
        write_test_image(&path, 8, 8);

        let backend = StillImageBackend::new(dir.path(), 50, 16);
        let stream = backend.open(&"file:shot.png".into()).unwrap();
        std::fs::remove_file(&path).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while stream.health().is_ok() {
            assert!(Instant::now() < deadline, "removal never detected");
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}
