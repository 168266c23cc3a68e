//! Immediate-mode UI composed with egui.
//!
//! Each frame the renderer calls [`UiLayer::begin_frame`], lets every
//! drawable compose into a [`UiFrame`], then calls [`UiLayer::end_frame`] to
//! tessellate and upload textures before any command is recorded. The
//! finalized draw data is recorded by [`UiLayer::record`] inside the
//! swapchain pass. The Vulkan implementation is
//! [`EguiLayer`](crate::egui_layer::EguiLayer).

use crate::error::{GpuError, Result};
use crate::frame::MAX_FRAMES_IN_FLIGHT;
use ash::vk;

pub trait UiLayer {
    /// Context drawables compose into.
    fn context(&self) -> &egui::Context;

    /// Start composing a UI frame for `slot`. The slot's previous frame has
    /// finished on the GPU.
    fn begin_frame(&mut self, slot: usize, input: egui::RawInput) -> Result<()>;

    /// Finish composition and prepare draw data for [`UiLayer::record`].
    fn end_frame(&mut self, slot: usize) -> Result<egui::PlatformOutput>;

    /// Record the finalized draw data. Called inside the swapchain pass.
    fn record(&mut self, cmd: vk::CommandBuffer, extent: vk::Extent2D) -> Result<()>;

    /// The swapchain render pass was recreated.
    fn set_render_pass(&mut self, render_pass: vk::RenderPass) -> Result<()>;

    /// Make a sampled image available to egui.
    fn register_texture(
        &mut self,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> Result<egui::TextureId>;

    /// Point a registered texture at a new image.
    ///
    /// The texture must not be in use by the GPU, which holds after a
    /// swapchain rebuild or a device-idle wait.
    fn update_texture(
        &mut self,
        id: egui::TextureId,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> Result<()>;
}

/// What a drawable sees during the UI pass.
pub struct UiFrame<'a> {
    ctx: egui::Context,
    layer: &'a mut dyn UiLayer,
}

impl<'a> UiFrame<'a> {
    pub fn new(layer: &'a mut dyn UiLayer) -> Self {
        Self {
            ctx: layer.context().clone(),
            layer,
        }
    }

    pub fn ctx(&self) -> &egui::Context {
        &self.ctx
    }

    /// See [`UiLayer::register_texture`].
    pub fn register_texture(
        &mut self,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> Result<egui::TextureId> {
        self.layer.register_texture(view, sampler)
    }

    /// See [`UiLayer::update_texture`].
    pub fn update_texture(
        &mut self,
        id: egui::TextureId,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> Result<()> {
        self.layer.update_texture(id, view, sampler)
    }
}

/// egui textures freed by a frame, released once that frame's slot comes
/// around again.
#[derive(Debug, Clone)]
pub struct DeferredFrees {
    per_slot: Vec<Vec<egui::TextureId>>,
}

impl Default for DeferredFrees {
    fn default() -> Self {
        Self {
            per_slot: vec![Vec::new(); MAX_FRAMES_IN_FLIGHT],
        }
    }
}

impl DeferredFrees {
    /// Queue `ids` freed during `slot`'s frame.
    pub fn defer(&mut self, slot: usize, ids: Vec<egui::TextureId>) -> Result<()> {
        self.per_slot
            .get_mut(slot)
            .ok_or_else(|| GpuError::InvalidState(format!("frame slot {slot} out of range")))?
            .extend(ids);
        Ok(())
    }

    /// Textures that are safe to release now that `slot` finished.
    pub fn take(&mut self, slot: usize) -> Vec<egui::TextureId> {
        self.per_slot
            .get_mut(slot)
            .map(std::mem::take)
            .unwrap_or_default()
    }
}

/// Runs egui passes without drawing anything.
#[derive(Default)]
pub struct HeadlessUi {
    ctx: egui::Context,
    textures: Vec<egui::TextureId>,
}

impl UiLayer for HeadlessUi {
    fn context(&self) -> &egui::Context {
        &self.ctx
    }

    fn begin_frame(&mut self, _slot: usize, input: egui::RawInput) -> Result<()> {
        self.ctx.begin_pass(input);
        Ok(())
    }

    fn end_frame(&mut self, _slot: usize) -> Result<egui::PlatformOutput> {
        Ok(self.ctx.end_pass().platform_output)
    }

    fn record(&mut self, _cmd: vk::CommandBuffer, _extent: vk::Extent2D) -> Result<()> {
        Ok(())
    }

    fn set_render_pass(&mut self, _render_pass: vk::RenderPass) -> Result<()> {
        Ok(())
    }

    fn register_texture(
        &mut self,
        _view: vk::ImageView,
        _sampler: vk::Sampler,
    ) -> Result<egui::TextureId> {
        let id = egui::TextureId::User(self.textures.len() as u64);
        self.textures.push(id);
        Ok(id)
    }

    fn update_texture(
        &mut self,
        id: egui::TextureId,
        _view: vk::ImageView,
        _sampler: vk::Sampler,
    ) -> Result<()> {
        if self.textures.contains(&id) {
            Ok(())
        } else {
            Err(GpuError::InvalidState(format!("unknown UI texture {id:?}")))
        }
    }
}
