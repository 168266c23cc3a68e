//! egui drawn into the swapchain pass through `egui-ash-renderer`.

use crate::command::CommandPool;
use crate::context::GpuContext;
use crate::descriptors::{write_combined_image_sampler, DescriptorPool, DescriptorSetLayoutBuilder};
use crate::error::{GpuError, Result};
use crate::frame::MAX_FRAMES_IN_FLIGHT;
use crate::handle::Owned;
use crate::ui::{DeferredFrees, UiLayer};
use ash::vk;
use egui_ash_renderer::{Options, Renderer as EguiRenderer};
use std::fmt::Display;
use std::sync::Arc;

fn ui_error(e: impl Display) -> GpuError {
    GpuError::Ui(e.to_string())
}

/// Whether egui should skip its own gamma conversion for `format`.
pub fn is_srgb(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::R8G8B8A8_SRGB
            | vk::Format::B8G8R8A8_SRGB
            | vk::Format::R8G8B8_SRGB
            | vk::Format::B8G8R8_SRGB
            | vk::Format::A8B8G8R8_SRGB_PACK32
    )
}

/// Layout of user texture sets: one combined image sampler for the
/// fragment stage, matching the renderer's pipeline layout.
pub fn user_texture_layout() -> DescriptorSetLayoutBuilder {
    DescriptorSetLayoutBuilder::new().sampled_image(0, vk::ShaderStageFlags::FRAGMENT)
}

/// [`UiLayer`] backed by egui and an ash renderer.
///
/// User textures are allocated from a dedicated pool sized for a UI library
/// and live as long as the layer.
pub struct EguiLayer {
    egui: egui::Context,
    renderer: EguiRenderer,
    primitives: Vec<egui::ClippedPrimitive>,
    pixels_per_point: f32,
    frees: DeferredFrees,
    user_textures: Vec<(egui::TextureId, vk::DescriptorSet)>,
    descriptor_pool: DescriptorPool,
    texture_layout: Owned<vk::DescriptorSetLayout>,
    upload_pool: CommandPool,
    ctx: Arc<GpuContext>,
}

impl EguiLayer {
    /// Create the layer for `render_pass`, whose color attachment has
    /// `surface_format`. `egui` must be the context fed by the window.
    pub fn new(
        ctx: Arc<GpuContext>,
        egui: egui::Context,
        render_pass: vk::RenderPass,
        surface_format: vk::Format,
    ) -> Result<Self> {
        let srgb = is_srgb(surface_format);
        let options = Options {
            in_flight_frames: MAX_FRAMES_IN_FLIGHT,
            srgb_framebuffer: srgb,
            ..Default::default()
        };
        let renderer = EguiRenderer::with_default_allocator(
            ctx.instance(),
            ctx.physical_device(),
            ctx.device().clone(),
            render_pass,
            options,
        )
        .map_err(ui_error)?;

        let upload_pool = CommandPool::new(
            &ctx,
            ctx.queue_families().graphics,
            vk::CommandPoolCreateFlags::TRANSIENT,
        )?;
        let descriptor_pool = DescriptorPool::for_ui(&ctx)?;
        let texture_layout = user_texture_layout().build(&ctx)?;
        tracing::debug!(srgb, "UI layer created");

        Ok(Self {
            egui,
            renderer,
            primitives: Vec::new(),
            pixels_per_point: 1.0,
            frees: DeferredFrees::default(),
            user_textures: Vec::new(),
            descriptor_pool,
            texture_layout,
            upload_pool,
            ctx,
        })
    }

    fn user_set(&self, id: egui::TextureId) -> Result<vk::DescriptorSet> {
        self.user_textures
            .iter()
            .find(|(user, _)| *user == id)
            .map(|&(_, set)| set)
            .ok_or_else(|| GpuError::InvalidState(format!("unknown UI texture {id:?}")))
    }
}

impl UiLayer for EguiLayer {
    fn context(&self) -> &egui::Context {
        &self.egui
    }

    fn begin_frame(&mut self, slot: usize, input: egui::RawInput) -> Result<()> {
        let released = self.frees.take(slot);
        if !released.is_empty() {
            self.renderer.free_textures(&released).map_err(ui_error)?;
        }
        self.egui.begin_pass(input);
        Ok(())
    }

    fn end_frame(&mut self, slot: usize) -> Result<egui::PlatformOutput> {
        let output = self.egui.end_pass();

        if !output.textures_delta.set.is_empty() {
            self.renderer
                .set_textures(
                    self.ctx.graphics_queue(),
                    self.upload_pool.handle(),
                    &output.textures_delta.set,
                )
                .map_err(ui_error)?;
        }
        self.frees.defer(slot, output.textures_delta.free)?;

        self.pixels_per_point = output.pixels_per_point;
        self.primitives = self.egui.tessellate(output.shapes, output.pixels_per_point);
        Ok(output.platform_output)
    }

    fn record(&mut self, cmd: vk::CommandBuffer, extent: vk::Extent2D) -> Result<()> {
        if self.primitives.is_empty() {
            return Ok(());
        }
        self.renderer
            .cmd_draw(cmd, extent, self.pixels_per_point, &self.primitives)
            .map_err(ui_error)
    }

    fn set_render_pass(&mut self, render_pass: vk::RenderPass) -> Result<()> {
        self.renderer.set_render_pass(render_pass).map_err(ui_error)
    }

    fn register_texture(
        &mut self,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> Result<egui::TextureId> {
        let set = self
            .descriptor_pool
            .allocate(&[self.texture_layout.raw()])?
            .first()
            .copied()
            .ok_or_else(|| GpuError::InvalidState("no descriptor set allocated".into()))?;
        // SAFETY: the set is fresh and unused.
        unsafe { write_combined_image_sampler(self.ctx.device(), set, 0, view, sampler) };

        let id = self.renderer.add_user_texture(set);
        self.user_textures.push((id, set));
        Ok(id)
    }

    fn update_texture(
        &mut self,
        id: egui::TextureId,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> Result<()> {
        let set = self.user_set(id)?;
        // SAFETY: callers guarantee the set is idle.
        unsafe { write_combined_image_sampler(self.ctx.device(), set, 0, view, sampler) };
        Ok(())
    }
}
