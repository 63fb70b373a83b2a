//! Transparent always-on-top overlay window
//!
//! Paints the renderer's current labels with egui_overlay. The window covers
//! the selected monitor and lets mouse input pass through.

use egui::{Align2, Color32, FontId, Id, LayerId, Order, Pos2, Rect, Rounding, Stroke, Vec2};
use egui_overlay::{egui_render_three_d::ThreeDBackend, egui_window_glfw_passthrough::GlfwBackend, EguiOverlay};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::widgets::{LabelStyle, OverlayLabel};
use super::OverlayRenderer;

/// Run the overlay event loop until the window closes or `shutdown` fires.
/// Must be called from the main thread.
pub fn run(renderer: Arc<OverlayRenderer>, shutdown: CancellationToken) {
    info!("Starting overlay window...");
    let app = OverlayApp {
        renderer,
        shutdown,
        placed: false,
        last_sequence: 0,
    };
    egui_overlay::start(app);
}

struct OverlayApp {
    renderer: Arc<OverlayRenderer>,
    shutdown: CancellationToken,
    /// Window has been moved onto its monitor
    placed: bool,
    last_sequence: u64,
}

impl OverlayApp {
    /// Cover the configured monitor, falling back to the primary one
    fn place_window(&mut self, glfw_backend: &mut GlfwBackend) {
        let monitor_index = self.renderer.config().monitor_index;

        let area = match monitor_index {
            Some(index) => glfw_backend.glfw.with_connected_monitors(|_, monitors| {
                monitors.get(index).and_then(|m| {
                    let (x, y) = m.get_pos();
                    m.get_video_mode().map(|mode| (x, y, mode.width, mode.height))
                })
            }),
            None => None,
        }
        .or_else(|| {
            glfw_backend.glfw.with_primary_monitor(|_, monitor| {
                monitor.and_then(|m| {
                    let (x, y) = m.get_pos();
                    m.get_video_mode().map(|mode| (x, y, mode.width, mode.height))
                })
            })
        });

        if let Some((x, y, width, height)) = area {
            debug!("Overlay window at ({}, {}) {}x{}", x, y, width, height);
            glfw_backend.window.set_pos(x, y);
            glfw_backend.window.set_size(width as i32, height as i32);
        }
        self.placed = true;
    }
}

impl EguiOverlay for OverlayApp {
    fn gui_run(
        &mut self,
        egui_ctx: &egui::Context,
        _default_gfx_backend: &mut ThreeDBackend,
        glfw_backend: &mut GlfwBackend,
    ) {
        if self.shutdown.is_cancelled() {
            glfw_backend.window.set_should_close(true);
            return;
        }
        if !self.placed {
            self.place_window(glfw_backend);
        }

        let config = self.renderer.config();
        glfw_backend.set_passthrough(config.click_through);

        let sequence = self.renderer.sequence();
        if sequence != self.last_sequence {
            self.last_sequence = sequence;
            debug!("Overlay window repainting update #{}", sequence);
        }

        let labels = self.renderer.labels();
        let style = self.renderer.style();
        let painter = egui_ctx.layer_painter(LayerId::new(Order::Foreground, Id::new("translation_labels")));
        let scale = 1.0 / egui_ctx.pixels_per_point();

        for label in &labels {
            draw_label(&painter, label, &style, scale);
        }

        egui_ctx.request_repaint_after(Duration::from_millis(100));
    }
}

fn color(rgba: [f32; 4]) -> Color32 {
    Color32::from_rgba_unmultiplied(
        (rgba[0] * 255.0) as u8,
        (rgba[1] * 255.0) as u8,
        (rgba[2] * 255.0) as u8,
        (rgba[3] * 255.0) as u8,
    )
}

/// Draw one label. Label geometry is in physical pixels.
fn draw_label(painter: &egui::Painter, label: &OverlayLabel, style: &LabelStyle, scale: f32) {
    let rect = Rect::from_min_size(
        Pos2::new(label.rect.x * scale, label.rect.y * scale),
        Vec2::new(label.rect.width * scale, label.rect.height * scale),
    );
    let rounding = Rounding::same(style.corner_radius);

    painter.rect_filled(rect, rounding, color(style.background));
    painter.rect_stroke(rect, rounding, Stroke::new(1.0, color(style.border_color)));

    let clipped = painter.with_clip_rect(rect);
    let font = FontId::proportional(label.font_size * scale);
    match &label.caption {
        Some(caption) => {
            let upper = Pos2::new(rect.center().x, rect.top() + rect.height() * 0.3);
            let lower = Pos2::new(rect.center().x, rect.top() + rect.height() * 0.75);
            clipped.text(upper, Align2::CENTER_CENTER, &label.text, font.clone(), color(style.text_color));
            clipped.text(
                lower,
                Align2::CENTER_CENTER,
                caption,
                FontId::proportional(font.size * 0.7),
                color(style.caption_color),
            );
        }
        None => {
            clipped.text(rect.center(), Align2::CENTER_CENTER, &label.text, font, color(style.text_color));
        }
    }
}
