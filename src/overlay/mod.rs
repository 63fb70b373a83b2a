//! Overlay Presentation Layer
//!
//! Holds the set of translated regions currently on screen and lays them out
//! as click-through labels. Every publish replaces the whole set; an empty
//! publish clears the overlay. Subscribers receive each published set over a
//! channel, and the optional window (feature `gui`) paints the current set.

pub mod widgets;
#[cfg(feature = "gui")]
pub mod window;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info};

use crate::config::OverlaySettings;
use crate::translate::TranslatedRegion;
use crate::overlay::widgets::{LabelLayout, LabelStyle, OverlayLabel};

/// Overlay configuration
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Label background opacity (0.0 - 1.0)
    pub opacity: f32,
    /// Label geometry
    pub layout: LabelLayout,
    /// Monitor to display overlay on
    pub monitor_index: Option<usize>,
    /// Let mouse input pass through the overlay window
    pub click_through: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self::from(&OverlaySettings::default())
    }
}

impl From<&OverlaySettings> for OverlayConfig {
    fn from(settings: &OverlaySettings) -> Self {
        Self {
            opacity: settings.opacity,
            layout: LabelLayout {
                offset: settings.offset,
                font_size: settings.font_size,
                show_caption: settings.show_caption,
            },
            monitor_index: settings.monitor_index,
            click_through: settings.click_through,
        }
    }
}

/// Receiver side of overlay publishes
pub trait OverlaySink: Send + Sync {
    /// Replace the displayed set. Must not block.
    fn render(&self, regions: Vec<TranslatedRegion>);
}

/// One published overlay set
#[derive(Debug, Clone)]
pub struct OverlayUpdate {
    /// Publish counter, starting at 1
    pub sequence: u64,
    pub regions: Arc<[TranslatedRegion]>,
}

/// What is currently on screen
#[derive(Debug)]
struct OverlayState {
    config: OverlayConfig,
    style: LabelStyle,
    regions: Arc<[TranslatedRegion]>,
    labels: Vec<OverlayLabel>,
    sequence: u64,
}

/// Owns the displayed translation set and fans updates out to subscribers
pub struct OverlayRenderer {
    state: RwLock<OverlayState>,
    subscribers: Mutex<Vec<Sender<OverlayUpdate>>>,
}

impl OverlayRenderer {
    pub fn new(config: OverlayConfig) -> Self {
        let style = LabelStyle::with_opacity(config.opacity);
        Self {
            state: RwLock::new(OverlayState {
                config,
                style,
                regions: Arc::from(Vec::new()),
                labels: Vec::new(),
                sequence: 0,
            }),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Receive every future publish
    pub fn subscribe(&self) -> Receiver<OverlayUpdate> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Labels currently displayed
    pub fn labels(&self) -> Vec<OverlayLabel> {
        self.state.read().labels.clone()
    }

    /// Regions currently displayed
    pub fn regions(&self) -> Arc<[TranslatedRegion]> {
        self.state.read().regions.clone()
    }

    /// Number of publishes so far
    pub fn sequence(&self) -> u64 {
        self.state.read().sequence
    }

    pub fn style(&self) -> LabelStyle {
        self.state.read().style.clone()
    }

    pub fn config(&self) -> OverlayConfig {
        self.state.read().config.clone()
    }
}

impl OverlaySink for OverlayRenderer {
    fn render(&self, regions: Vec<TranslatedRegion>) {
        let regions: Arc<[TranslatedRegion]> = Arc::from(regions);

        let update = {
            let mut state = self.state.write();
            state.labels = state.config.layout.layout(&regions);
            state.regions = regions.clone();
            state.sequence += 1;
            OverlayUpdate {
                sequence: state.sequence,
                regions,
            }
        };

        debug!(
            "Overlay update #{}: {} regions",
            update.sequence,
            update.regions.len()
        );

        self.subscribers
            .lock()
            .retain(|tx| tx.send(update.clone()).is_ok());
    }
}

/// Present overlay updates without a window: each update is logged, and
/// written to stdout as one JSON line when `json` is set.
pub fn spawn_headless_presenter(
    renderer: &OverlayRenderer,
    json: bool,
) -> JoinHandle<()> {
    let updates = renderer.subscribe();
    let layout = renderer.config().layout;

    std::thread::spawn(move || {
        info!("Headless overlay presenter started");
        for update in updates.iter() {
            let labels = layout.layout(&update.regions);
            if labels.is_empty() {
                info!("Overlay cleared");
            } else {
                info!("Overlay showing {} labels", labels.len());
                for label in &labels {
                    debug!(
                        "  ({:.0}, {:.0}) {}x{}: {}",
                        label.rect.x, label.rect.y, label.rect.width, label.rect.height, label.text
                    );
                }
            }
            if json {
                match serde_json::to_string(&labels) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!("Failed to encode overlay update: {}", e),
                }
            }
        }
        info!("Headless overlay presenter exiting");
    })
}
