//! Translation Pipeline
//!
//! Drives capture → recognition → translation → overlay on a fixed period.
//!
//! - A tick that fires while a pass is still running is dropped, never queued.
//! - Every capture session has an epoch. A pass publishes only if its epoch is
//!   still current, checked under the same lock `stop()` uses to publish the
//!   clearing update, so a pass that finishes after `stop()` is discarded.
//! - Recognition failures keep the previous overlay; translation failures and
//!   empty detections clear it.

pub mod guard;

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::{CaptureBackend, CaptureError, Frame, FrameSource, Source, SourceId};
use crate::config::PipelineSettings;
use crate::overlay::OverlaySink;
use crate::translate::{TranslateError, TranslatedRegion, Translator};
use crate::vision::{OcrError, RecognizedRegion, TextRecognizer};

use self::guard::InFlight;

/// Capture session state visible to the control surface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineState {
    pub is_capturing: bool,
    pub active_source_id: Option<SourceId>,
}

/// Counters for pipeline activity
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    /// Passes whose result reached the overlay
    pub passes_published: u64,
    /// Ticks skipped because a pass was in flight
    pub ticks_dropped: u64,
    /// Passes that found no frame yet
    pub frames_missing: u64,
    pub recognition_failures: u64,
    pub translation_failures: u64,
    /// Results thrown away because their session had ended
    pub stale_discarded: u64,
    /// Sessions ended by a capture fault
    pub capture_failures: u64,
    /// Wall time of the last published pass
    pub last_pass_ms: Option<u64>,
}

#[derive(Debug, Default)]
struct Session {
    epoch: u64,
    state: PipelineState,
}

/// State shared between the controller and its tick loop
struct Shared {
    frames: Mutex<FrameSource>,
    recognizer: Arc<TextRecognizer>,
    translator: Arc<Translator>,
    sink: Arc<dyn OverlaySink>,
    session: Mutex<Session>,
    stats: Mutex<PipelineStats>,
    in_flight: InFlight,
    stage_timeout: Duration,
}

struct Ticker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the capture session and schedules pipeline passes
pub struct PipelineController {
    shared: Arc<Shared>,
    /// Enumeration goes straight to the backend, not through the stream lock
    backend: Arc<dyn CaptureBackend>,
    tick_interval: Duration,
    /// Serializes start/stop
    lifecycle: tokio::sync::Mutex<Option<Ticker>>,
}

impl PipelineController {
    pub fn new(
        frames: FrameSource,
        recognizer: Arc<TextRecognizer>,
        translator: Arc<Translator>,
        sink: Arc<dyn OverlaySink>,
        settings: &PipelineSettings,
    ) -> Self {
        Self {
            backend: frames.backend(),
            shared: Arc::new(Shared {
                frames: Mutex::new(frames),
                recognizer,
                translator,
                sink,
                session: Mutex::new(Session::default()),
                stats: Mutex::new(PipelineStats::default()),
                in_flight: InFlight::new(),
                stage_timeout: Duration::from_millis(settings.stage_timeout_ms.max(1)),
            }),
            tick_interval: Duration::from_millis(settings.tick_interval_ms.max(1)),
            lifecycle: tokio::sync::Mutex::new(None),
        }
    }

    /// Enumerate capturable sources
    pub fn list_sources(&self) -> Result<Vec<Source>, CaptureError> {
        self.backend.list_sources()
    }

    /// Open `source_id` and begin ticking. An active session is stopped first,
    /// even when it captures the same source. On failure the controller stays
    /// idle.
    pub async fn start(&self, source_id: SourceId) -> Result<(), CaptureError> {
        let mut lifecycle = self.lifecycle.lock().await;
        self.stop_locked(&mut lifecycle).await;

        let opened = self.shared.frames.lock().open(&source_id);
        if let Err(e) = opened {
            warn!("Failed to start capture on {}: {}", source_id, e);
            return Err(e);
        }

        let epoch = {
            let mut session = self.shared.session.lock();
            session.epoch += 1;
            session.state = PipelineState {
                is_capturing: true,
                active_source_id: Some(source_id.clone()),
            };
            session.epoch
        };

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_ticker(
            self.shared.clone(),
            epoch,
            self.tick_interval,
            cancel.clone(),
        ));
        *lifecycle = Some(Ticker { cancel, handle });

        info!(
            "Capture started on {} (every {:?})",
            source_id, self.tick_interval
        );
        Ok(())
    }

    /// Stop ticking, close the source and clear the overlay. No-op when idle.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        self.stop_locked(&mut lifecycle).await;
    }

    async fn stop_locked(&self, lifecycle: &mut Option<Ticker>) {
        if let Some(ticker) = lifecycle.take() {
            ticker.cancel.cancel();
            if let Err(e) = ticker.handle.await {
                warn!("Tick loop ended abnormally: {}", e);
            }
        }
        self.shared.end_session(None);
    }

    pub fn state(&self) -> PipelineState {
        self.shared.session.lock().state.clone()
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.stats.lock().clone()
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        if let Some(ticker) = self.lifecycle.get_mut().take() {
            ticker.cancel.cancel();
        }
    }
}

impl Shared {
    fn is_current(&self, epoch: u64) -> bool {
        let session = self.session.lock();
        session.state.is_capturing && session.epoch == epoch
    }

    /// End the session (only if it is still `epoch`, when given): close the
    /// source, reset state and publish an empty set. Returns whether a
    /// session was ended.
    fn end_session(&self, epoch: Option<u64>) -> bool {
        let mut session = self.session.lock();
        if epoch.is_some_and(|e| e != session.epoch) || !session.state.is_capturing {
            return false;
        }

        session.epoch += 1;
        let previous = std::mem::take(&mut session.state);
        self.frames.lock().close();
        self.sink.render(Vec::new());

        if let Some(source) = previous.active_source_id {
            info!("Capture stopped on {}", source);
        }
        true
    }

    /// Publish `regions` if `epoch` is still the live session
    fn publish(&self, epoch: u64, regions: Vec<TranslatedRegion>, started: Instant) {
        let session = self.session.lock();
        if session.epoch != epoch || !session.state.is_capturing {
            drop(session);
            self.stats.lock().stale_discarded += 1;
            debug!("Discarding result of ended session {}", epoch);
            return;
        }

        let count = regions.len();
        self.sink.render(regions);
        drop(session);

        let elapsed = started.elapsed();
        let mut stats = self.stats.lock();
        stats.passes_published += 1;
        stats.last_pass_ms = Some(elapsed.as_millis() as u64);
        debug!("Published {} regions in {:?}", count, elapsed);
    }

    async fn recognize(&self, frame: &Frame) -> Result<Vec<RecognizedRegion>, OcrError> {
        let limit = self.stage_timeout;
        tokio::time::timeout(limit, self.recognizer.recognize(frame))
            .await
            .unwrap_or_else(|_| Err(OcrError::Timeout(limit.as_millis() as u64)))
    }

    async fn translate(
        &self,
        regions: Vec<RecognizedRegion>,
    ) -> Result<Vec<TranslatedRegion>, TranslateError> {
        let limit = self.stage_timeout;
        tokio::time::timeout(limit, self.translator.translate(regions))
            .await
            .unwrap_or_else(|_| Err(TranslateError::Timeout(limit.as_millis() as u64)))
    }

    /// One capture → recognize → translate → publish pass
    async fn run_pass(&self, epoch: u64) {
        if !self.is_current(epoch) {
            return;
        }
        let started = Instant::now();

        let frame = self.frames.lock().capture_frame();
        let Some(frame) = frame else {
            self.stats.lock().frames_missing += 1;
            debug!("No frame decoded yet");
            return;
        };

        let regions = match self.recognize(&frame).await {
            Ok(regions) => regions,
            Err(e) => {
                self.stats.lock().recognition_failures += 1;
                warn!("Recognition failed, keeping previous overlay: {}", e);
                return;
            }
        };
        drop(frame);

        if regions.is_empty() {
            self.publish(epoch, Vec::new(), started);
            return;
        }

        let translated = match self.translate(regions).await {
            Ok(translated) => translated,
            Err(e) => {
                self.stats.lock().translation_failures += 1;
                warn!("Translation failed, clearing overlay: {}", e);
                Vec::new()
            }
        };
        self.publish(epoch, translated, started);
    }
}

async fn run_ticker(shared: Arc<Shared>, epoch: u64, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let health = shared.frames.lock().health();
        if let Err(e) = health {
            warn!("Capture failed, ending session: {}", e);
            if shared.end_session(Some(epoch)) {
                shared.stats.lock().capture_failures += 1;
            }
            break;
        }

        let Some(guard) = shared.in_flight.try_acquire() else {
            shared.stats.lock().ticks_dropped += 1;
            debug!("Pass still in flight, dropping tick");
            continue;
        };

        let pass = shared.clone();
        tokio::spawn(async move {
            let _guard = guard;
            pass.run_pass(epoch).await;
        });
    }

    debug!("Tick loop for session {} exited", epoch);
}
