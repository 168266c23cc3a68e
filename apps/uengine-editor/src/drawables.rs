//! Drawables registered by the editor.

use std::time::Instant;

use ash::vk;
use glam::Vec3;
use uengine_gpu::{Drawable, GpuError, OffscreenTarget, ResourceFactory, UiFrame};

/// Hue offsets of the red, green and blue channels, a third of a turn apart.
const PHASES: Vec3 = Vec3::new(0.0, 2.094_395, 4.188_79);

/// Background color of the sprite preview `t` seconds into the session.
pub fn preview_color(t: f32) -> [f32; 4] {
    let phase = PHASES + Vec3::splat(t);
    let rgb = Vec3::new(phase.x.sin(), phase.y.sin(), phase.z.sin()) * 0.25 + Vec3::splat(0.35);
    rgb.extend(1.0).to_array()
}

/// Preview panel size for a window extent.
pub const fn preview_size(width: u32, height: u32) -> (u32, u32) {
    (width / 2, height)
}

/// Renders the sprite preview into an offscreen target the UI samples.
pub struct PreviewDrawable {
    target: OffscreenTarget,
    start: Instant,
    /// UI texture and the view it currently points at.
    texture: Option<(egui::TextureId, vk::ImageView)>,
    deferred_error: Option<GpuError>,
}

impl PreviewDrawable {
    pub fn new(factory: &ResourceFactory, width: u32, height: u32) -> uengine_gpu::Result<Self> {
        let (w, h) = preview_size(width, height);
        Ok(Self {
            target: OffscreenTarget::new(factory, w, h)?,
            start: Instant::now(),
            texture: None,
            deferred_error: None,
        })
    }

    /// Register the target with the UI, or repoint it after a resize.
    fn sync_texture(&mut self, ui: &mut UiFrame<'_>) -> uengine_gpu::Result<Option<egui::TextureId>> {
        let Some((view, sampler)) = self.target.sampled() else {
            return Ok(None);
        };
        let id = match self.texture {
            Some((id, bound)) if bound == view => id,
            Some((id, _)) => {
                ui.update_texture(id, view, sampler)?;
                id
            }
            None => ui.register_texture(view, sampler)?,
        };
        self.texture = Some((id, view));
        Ok(Some(id))
    }
}

impl Drawable for PreviewDrawable {
    fn on_ui(&mut self, ui: &mut UiFrame<'_>) {
        let texture = match self.sync_texture(ui) {
            Ok(texture) => texture,
            Err(e) => {
                tracing::error!("Preview texture update failed: {e}");
                self.deferred_error = Some(e);
                None
            }
        };
        let Some(extent) = self.target.extent() else {
            return;
        };

        let ctx = ui.ctx();
        let size = egui::vec2(extent.width as f32, extent.height as f32) / ctx.pixels_per_point();
        egui::SidePanel::left("sprite_preview")
            .resizable(false)
            .exact_width(size.x)
            .frame(egui::Frame::default())
            .show(ctx, |panel| {
                if let Some(id) = texture {
                    panel.image((id, size));
                }
            });
    }

    fn on_render(&mut self, cmd: vk::CommandBuffer) -> uengine_gpu::Result<()> {
        if let Some(e) = self.deferred_error.take() {
            return Err(e);
        }
        let color = preview_color(self.start.elapsed().as_secs_f32());
        // SAFETY: drawables record outside of any render pass.
        unsafe { self.target.record_clear(cmd, color) }
    }

    fn on_resize(&mut self, width: u32, height: u32) {
        let (w, h) = preview_size(width, height);
        if let Err(e) = self.target.resize(w, h) {
            tracing::error!("Preview resize to {w}x{h} failed: {e}");
            self.deferred_error = Some(e);
        }
    }
}

/// Shows the presentation extent and frame count; logs extent changes.
#[derive(Debug, Default)]
pub struct StatusDrawable {
    extent: (u32, u32),
    frames: u64,
}

impl StatusDrawable {
    pub const fn extent(&self) -> (u32, u32) {
        self.extent
    }

    pub const fn frames(&self) -> u64 {
        self.frames
    }
}

impl Drawable for StatusDrawable {
    fn on_ui(&mut self, ui: &mut UiFrame<'_>) {
        self.frames += 1;
        let (width, height) = self.extent;
        egui::Window::new("Status")
            .resizable(false)
            .anchor(egui::Align2::RIGHT_TOP, egui::vec2(-8.0, 8.0))
            .show(ui.ctx(), |window| {
                window.label(format!("Extent: {width}x{height}"));
                window.label(format!("Frames: {}", self.frames));
            });
    }

    fn on_render(&mut self, _cmd: vk::CommandBuffer) -> uengine_gpu::Result<()> {
        Ok(())
    }

    fn on_resize(&mut self, width: u32, height: u32) {
        if (width, height) == (0, 0) {
            tracing::info!("Window minimized");
        } else {
            tracing::info!("Presentation extent: {width}x{height}");
        }
        self.extent = (width, height);
    }
}
