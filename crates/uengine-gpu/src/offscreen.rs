//! Sampled color target for drawables that render outside the swapchain.
//!
//! The render pass leaves the image in `SHADER_READ_ONLY_OPTIMAL`, so the
//! result can be sampled by the UI in the same command buffer.

use crate::error::{GpuError, Result};
use crate::factory::ResourceFactory;
use crate::handle::Owned;
use crate::memory::{image_2d_info, Image};
use crate::texture::color_subresource_range;
use ash::vk;

/// Color format of every offscreen target.
pub const OFFSCREEN_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// What to do with the attachment when a new size arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePlan {
    /// Zero-sized; keep what exists and wait for a usable size.
    Defer,
    /// Same size as the current attachment.
    Keep,
    /// Drop the attachment and build one of this size.
    Recreate(vk::Extent2D),
}

/// Decide how a target of `current` extent reacts to `width` x `height`.
pub fn plan_resize(current: Option<vk::Extent2D>, width: u32, height: u32) -> ResizePlan {
    if width == 0 || height == 0 {
        return ResizePlan::Defer;
    }
    let requested = vk::Extent2D { width, height };
    match current {
        Some(extent) if extent == requested => ResizePlan::Keep,
        _ => ResizePlan::Recreate(requested),
    }
}

/// Subpass dependencies around a pass whose output is sampled afterwards.
pub fn sampled_target_dependencies() -> [vk::SubpassDependency; 2] {
    [
        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::SHADER_READ)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dependency_flags(vk::DependencyFlags::BY_REGION),
        vk::SubpassDependency::default()
            .src_subpass(0)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ)
            .dependency_flags(vk::DependencyFlags::BY_REGION),
    ]
}

struct Attachment {
    framebuffer: Owned<vk::Framebuffer>,
    sampler: Owned<vk::Sampler>,
    view: Owned<vk::ImageView>,
    image: Image,
    extent: vk::Extent2D,
}

pub struct OffscreenTarget {
    factory: ResourceFactory,
    attachment: Option<Attachment>,
    render_pass: Owned<vk::RenderPass>,
}

impl OffscreenTarget {
    /// Create the render pass and, for a nonzero size, the attachment.
    pub fn new(factory: &ResourceFactory, width: u32, height: u32) -> Result<Self> {
        let render_pass = create_render_pass(factory)?;
        let mut target = Self {
            factory: factory.clone(),
            attachment: None,
            render_pass,
        };
        target.resize(width, height)?;
        Ok(target)
    }

    /// Rebuild the attachment for a new size. Zero sizes are deferred.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        match plan_resize(self.extent(), width, height) {
            ResizePlan::Defer => {
                tracing::trace!("Offscreen resize to {width}x{height} deferred");
                Ok(())
            }
            ResizePlan::Keep => Ok(()),
            ResizePlan::Recreate(extent) => {
                if self.attachment.is_some() {
                    self.factory.context().wait_idle()?;
                    self.attachment = None;
                }
                self.attachment = Some(self.create_attachment(extent)?);
                tracing::debug!("Offscreen target resized to {width}x{height}");
                Ok(())
            }
        }
    }

    fn create_attachment(&self, extent: vk::Extent2D) -> Result<Attachment> {
        let image = self.factory.create_image(
            &image_2d_info(
                extent.width,
                extent.height,
                OFFSCREEN_FORMAT,
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            ),
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let view = self.factory.create_image_view(
            &vk::ImageViewCreateInfo::default()
                .image(image.handle())
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(OFFSCREEN_FORMAT)
                .subresource_range(color_subresource_range()),
        )?;

        let sampler = self.factory.create_sampler(
            &vk::SamplerCreateInfo::default()
                .mag_filter(vk::Filter::LINEAR)
                .min_filter(vk::Filter::LINEAR)
                .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
                .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
                .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
                .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
                .max_lod(1.0)
                .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE),
        )?;

        let attachments = [view.raw()];
        let framebuffer = self.factory.create_framebuffer(
            &vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass.raw())
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1),
        )?;

        Ok(Attachment {
            framebuffer,
            sampler,
            view,
            image,
            extent,
        })
    }

    /// Current attachment size, `None` until a nonzero size was seen.
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.attachment.as_ref().map(|a| a.extent)
    }

    pub fn is_ready(&self) -> bool {
        self.attachment.is_some()
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.raw()
    }

    pub fn image(&self) -> Option<vk::Image> {
        self.attachment.as_ref().map(|a| a.image.handle())
    }

    /// View and sampler for a combined image sampler descriptor.
    pub fn sampled(&self) -> Option<(vk::ImageView, vk::Sampler)> {
        self.attachment
            .as_ref()
            .map(|a| (a.view.raw(), a.sampler.raw()))
    }

    /// Begin the target's render pass, clearing to `color`.
    ///
    /// # Safety
    /// `cmd` must be recording outside of any render pass.
    pub unsafe fn begin(&self, cmd: vk::CommandBuffer, color: [f32; 4]) -> Result<()> {
        let attachment = self
            .attachment
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("offscreen target has no attachment".into()))?;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        }];
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass.raw())
            .framebuffer(attachment.framebuffer.raw())
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: attachment.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            self.factory.context().device().cmd_begin_render_pass(
                cmd,
                &begin_info,
                vk::SubpassContents::INLINE,
            );
        }
        Ok(())
    }

    /// End the pass started by [`OffscreenTarget::begin`].
    ///
    /// # Safety
    /// `cmd` must be inside this target's render pass.
    pub unsafe fn end(&self, cmd: vk::CommandBuffer) {
        unsafe { self.factory.context().device().cmd_end_render_pass(cmd) };
    }

    /// Clear the target to `color`. Does nothing while the size is deferred.
    ///
    /// # Safety
    /// `cmd` must be recording outside of any render pass.
    pub unsafe fn record_clear(&self, cmd: vk::CommandBuffer, color: [f32; 4]) -> Result<()> {
        if !self.is_ready() {
            return Ok(());
        }
        unsafe {
            self.begin(cmd, color)?;
            self.end(cmd);
        }
        Ok(())
    }
}

fn create_render_pass(factory: &ResourceFactory) -> Result<Owned<vk::RenderPass>> {
    let attachments = [vk::AttachmentDescription::default()
        .format(OFFSCREEN_FORMAT)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];

    let color_refs = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)];
    let dependencies = sampled_target_dependencies();

    factory.create_render_pass(
        &vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies),
    )
}
