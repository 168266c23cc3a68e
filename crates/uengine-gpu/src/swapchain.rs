//! Swapchain management.
//!
//! [`SwapchainManager`] owns everything whose size or count depends on the
//! surface: the swapchain, its images and views, one framebuffer per view,
//! and the render pass they bind. Each piece is created and destroyed by its
//! own step so the rebuild sequence can run them in dependency order.

use crate::backend::{AcquireOutcome, PresentOutcome};
use crate::context::{GpuContext, QueueFamilies};
use crate::error::{log_teardown, GpuError, Result};
use crate::handle::Owned;
use crate::texture::color_subresource_range;
use ash::vk;
use std::sync::Arc;

/// Select the surface format, preferring `B8G8R8A8_UNORM` with sRGB-nonlinear
/// color space and falling back to the first reported format.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_UNORM
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first())
        .copied()
}

/// Select the present mode: mailbox when offered, otherwise FIFO.
pub fn select_present_mode(available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if available.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Calculate swapchain extent.
///
/// The surface's current extent wins unless it is the `u32::MAX` sentinel,
/// in which case the framebuffer size is clamped into the allowed range.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_size: (u32, u32),
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: framebuffer_size.0.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: framebuffer_size.1.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// One more than the minimum image count, capped by a nonzero maximum.
pub const fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        count
    }
}

/// Concurrent sharing across both families when they differ.
pub fn sharing_mode(families: QueueFamilies) -> (vk::SharingMode, Vec<u32>) {
    if families.graphics == families.present {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (
            vk::SharingMode::CONCURRENT,
            vec![families.graphics, families.present],
        )
    }
}

/// Map an acquire result onto the recoverable outcomes.
pub fn classify_acquire(result: ash::prelude::VkResult<(u32, bool)>) -> Result<AcquireOutcome> {
    match result {
        Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Ready {
            image_index,
            suboptimal,
        }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(e) => Err(GpuError::from(e)),
    }
}

/// Map a present result onto the recoverable outcomes.
pub fn classify_present(result: ash::prelude::VkResult<bool>) -> Result<PresentOutcome> {
    match result {
        Ok(false) => Ok(PresentOutcome::Optimal),
        Ok(true) => Ok(PresentOutcome::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
        Err(e) => Err(GpuError::from(e)),
    }
}

/// Surface-dependent presentation state.
pub struct SwapchainManager {
    ctx: Arc<GpuContext>,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    swapchain: Option<vk::SwapchainKHR>,
    images: Vec<vk::Image>,
    image_views: Vec<Owned<vk::ImageView>>,
    framebuffers: Vec<Owned<vk::Framebuffer>>,
    render_pass: Option<Owned<vk::RenderPass>>,
}

impl SwapchainManager {
    /// Create an empty manager. Nothing is allocated until the create steps run.
    pub fn new(ctx: Arc<GpuContext>) -> Self {
        Self {
            ctx,
            format: vk::SurfaceFormatKHR::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D::default(),
            swapchain: None,
            images: Vec::new(),
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            render_pass: None,
        }
    }

    /// Run every create step in order for `framebuffer_size`.
    pub fn build(&mut self, framebuffer_size: (u32, u32)) -> Result<()> {
        self.create_render_pass()?;
        self.create_swapchain(framebuffer_size)?;
        self.create_image_views()?;
        self.create_framebuffers()
    }

    /// Create the presentation render pass in the preferred surface format.
    pub fn create_render_pass(&mut self) -> Result<()> {
        let support = unsafe { self.ctx.surface().support(self.ctx.physical_device())? };
        self.format = select_surface_format(&support.formats)
            .ok_or_else(|| GpuError::SwapchainCreation("surface reports no formats".into()))?;

        let attachments = [vk::AttachmentDescription::default()
            .format(self.format.format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)];

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)];

        let dependencies = [vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            )];

        let info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { self.ctx.device().create_render_pass(&info, None)? };
        // SAFETY: just created from this device.
        self.render_pass = Some(unsafe { Owned::from_raw(self.ctx.clone(), render_pass) });
        Ok(())
    }

    /// Create the swapchain and fetch its images.
    pub fn create_swapchain(&mut self, framebuffer_size: (u32, u32)) -> Result<()> {
        let support = unsafe { self.ctx.surface().support(self.ctx.physical_device())? };
        let caps = &support.capabilities;

        self.present_mode = select_present_mode(&support.present_modes);
        self.extent = choose_extent(caps, framebuffer_size);
        let image_count = choose_image_count(caps);
        let (sharing, family_indices) = sharing_mode(self.ctx.queue_families());

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.ctx.surface().handle())
            .min_image_count(image_count)
            .image_format(self.format.format)
            .image_color_space(self.format.color_space)
            .image_extent(self.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing)
            .queue_family_indices(&family_indices)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let loader = self.ctx.swapchain_loader();
        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;
        self.swapchain = Some(swapchain);
        self.images = unsafe { loader.get_swapchain_images(swapchain)? };

        tracing::info!(
            "Swapchain created: {}x{}, {} images, {:?}, {:?}",
            self.extent.width,
            self.extent.height,
            self.images.len(),
            self.format.format,
            self.present_mode,
        );
        Ok(())
    }

    /// Create one color view per swapchain image.
    pub fn create_image_views(&mut self) -> Result<()> {
        let mut views = Vec::with_capacity(self.images.len());
        for &image in &self.images {
            let info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(color_subresource_range());
            let view = unsafe { self.ctx.device().create_image_view(&info, None)? };
            // SAFETY: just created from this device.
            views.push(unsafe { Owned::from_raw(self.ctx.clone(), view) });
        }
        self.image_views = views;
        Ok(())
    }

    /// Create one framebuffer per image view, bound to the render pass.
    pub fn create_framebuffers(&mut self) -> Result<()> {
        let render_pass = self.render_pass()?;
        let mut framebuffers = Vec::with_capacity(self.image_views.len());
        for view in &self.image_views {
            let attachments = [view.raw()];
            let info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);
            let framebuffer = unsafe { self.ctx.device().create_framebuffer(&info, None)? };
            // SAFETY: just created from this device.
            framebuffers.push(unsafe { Owned::from_raw(self.ctx.clone(), framebuffer) });
        }
        self.framebuffers = framebuffers;
        Ok(())
    }

    /// Destroy all framebuffers.
    pub fn destroy_framebuffers(&mut self) {
        self.framebuffers.clear();
    }

    /// Destroy all image views.
    pub fn destroy_image_views(&mut self) {
        self.image_views.clear();
    }

    /// Destroy the render pass.
    pub fn destroy_render_pass(&mut self) {
        self.render_pass = None;
    }

    /// Destroy the swapchain. Its images go with it.
    pub fn destroy_swapchain(&mut self) {
        self.images.clear();
        if let Some(swapchain) = self.swapchain.take() {
            // SAFETY: the caller waited for the device to go idle.
            unsafe { self.ctx.swapchain_loader().destroy_swapchain(swapchain, None) };
        }
    }

    /// Acquire the next presentable image, signaling `semaphore`.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<AcquireOutcome> {
        let swapchain = self.swapchain()?;
        classify_acquire(unsafe {
            self.ctx.swapchain_loader().acquire_next_image(
                swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        })
    }

    /// Queue `image_index` for presentation after `wait` is signaled.
    pub fn present(&self, image_index: u32, wait: vk::Semaphore) -> Result<PresentOutcome> {
        let swapchains = [self.swapchain()?];
        let image_indices = [image_index];
        let wait_semaphores = [wait];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        classify_present(unsafe {
            self.ctx
                .swapchain_loader()
                .queue_present(self.ctx.present_queue(), &present_info)
        })
    }

    /// Begin the clear pass on the framebuffer for `image_index`.
    ///
    /// # Safety
    /// `cmd` must be recording outside of any render pass.
    pub unsafe fn begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        image_index: u32,
        clear_color: [f32; 4],
    ) -> Result<()> {
        let framebuffer = self
            .framebuffers
            .get(image_index as usize)
            .ok_or_else(|| GpuError::InvalidState(format!("no framebuffer for image {image_index}")))?;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        }];
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass()?)
            .framebuffer(framebuffer.raw())
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: self.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            self.ctx
                .device()
                .cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
        }
        Ok(())
    }

    fn swapchain(&self) -> Result<vk::SwapchainKHR> {
        self.swapchain
            .ok_or_else(|| GpuError::InvalidState("swapchain not created".into()))
    }

    /// Raw render pass handle.
    pub fn render_pass(&self) -> Result<vk::RenderPass> {
        self.render_pass
            .as_ref()
            .map(Owned::raw)
            .ok_or_else(|| GpuError::InvalidState("render pass not created".into()))
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Images, views and framebuffers line up one to one.
    pub fn is_consistent(&self) -> bool {
        self.images.len() == self.image_views.len() && self.image_views.len() == self.framebuffers.len()
    }
}

impl Drop for SwapchainManager {
    fn drop(&mut self) {
        log_teardown("Device wait idle", self.ctx.wait_idle());
        self.destroy_framebuffers();
        self.destroy_image_views();
        self.destroy_render_pass();
        self.destroy_swapchain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn current_extent_is_used_verbatim() {
        let caps = caps((800, 600), (1, 1), (4096, 4096));
        let extent = choose_extent(&caps, (1200, 600));
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn undefined_extent_takes_framebuffer_size() {
        let caps = caps((u32::MAX, u32::MAX), (1, 1), (4096, 4096));
        let extent = choose_extent(&caps, (1200, 600));
        assert_eq!((extent.width, extent.height), (1200, 600));
    }

    #[test]
    fn undefined_extent_is_clamped() {
        let caps = caps((u32::MAX, u32::MAX), (100, 100), (1024, 512));
        let extent = choose_extent(&caps, (2000, 50));
        assert_eq!((extent.width, extent.height), (1024, 100));
    }

    #[test]
    fn image_count_respects_maximum() {
        let mut caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&caps), 3);
        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);
        caps.max_image_count = 8;
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn prefers_bgra_unorm_srgb_nonlinear() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(
            select_surface_format(&formats).map(|f| f.format),
            Some(vk::Format::B8G8R8A8_UNORM)
        );
        assert_eq!(
            select_surface_format(&formats[..1]).map(|f| f.format),
            Some(vk::Format::R8G8B8A8_SRGB)
        );
        assert!(select_surface_format(&[]).is_none());
    }

    #[test]
    fn present_mode_prefers_mailbox_then_fifo() {
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn sharing_is_concurrent_only_for_split_families() {
        let (mode, indices) = sharing_mode(QueueFamilies {
            graphics: 0,
            present: 0,
        });
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(indices.is_empty());

        let (mode, indices) = sharing_mode(QueueFamilies {
            graphics: 0,
            present: 2,
        });
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn acquire_results_are_classified() {
        assert_eq!(
            classify_acquire(Ok((2, true))).unwrap(),
            AcquireOutcome::Ready {
                image_index: 2,
                suboptimal: true
            }
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireOutcome::OutOfDate
        );
        assert!(matches!(
            classify_acquire(Err(vk::Result::TIMEOUT)),
            Err(GpuError::Vulkan(vk::Result::TIMEOUT))
        ));
        assert!(classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
    }

    #[test]
    fn present_results_are_classified() {
        assert_eq!(classify_present(Ok(false)).unwrap(), PresentOutcome::Optimal);
        assert_eq!(classify_present(Ok(true)).unwrap(), PresentOutcome::Suboptimal);
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentOutcome::OutOfDate
        );
        assert!(classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
    }
}
