//! The seam between frame scheduling and the graphics API.
//!
//! [`Renderer`](crate::renderer::Renderer) drives a [`RenderBackend`] through
//! the per-frame protocol and the swapchain rebuild sequence. The Vulkan
//! implementation lives in [`crate::vulkan`].

use crate::error::Result;
use ash::vk;

/// Result of acquiring a presentable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired; `suboptimal` images are still rendered.
    Ready { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface; nothing was acquired.
    OutOfDate,
}

/// Result of queueing an image for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Optimal,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    /// Whether the swapchain should be rebuilt before the next frame.
    pub const fn needs_rebuild(self) -> bool {
        !matches!(self, Self::Optimal)
    }
}

/// Operations the frame scheduler needs from the graphics API.
///
/// `slot` always names one of the
/// [`MAX_FRAMES_IN_FLIGHT`](crate::frame::MAX_FRAMES_IN_FLIGHT) frame slots.
pub trait RenderBackend {
    /// Extent of the current swapchain images.
    fn extent(&self) -> vk::Extent2D;

    /// Render pass of the swapchain framebuffers.
    fn present_render_pass(&self) -> Result<vk::RenderPass>;

    /// Number of images in the current swapchain.
    fn image_count(&self) -> usize;

    /// Block until the slot's in-flight fence is signaled.
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;

    /// Acquire the next image, signaling the slot's image-available semaphore.
    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireOutcome>;

    /// Reset and begin the slot's command buffer.
    fn begin_commands(&mut self, slot: usize) -> Result<vk::CommandBuffer>;

    /// Begin the swapchain clear pass on the framebuffer of `image_index`.
    fn begin_present_pass(&mut self, slot: usize, image_index: u32, clear_color: [f32; 4])
        -> Result<()>;

    /// End the swapchain pass.
    fn end_present_pass(&mut self, slot: usize) -> Result<()>;

    /// Finish recording the slot's command buffer.
    fn end_commands(&mut self, slot: usize) -> Result<()>;

    /// Reset the slot fence and submit its command buffer, waiting on
    /// image-available and signaling render-finished plus the fence.
    fn submit(&mut self, slot: usize) -> Result<()>;

    /// Present `image_index` once the slot's render-finished semaphore fires.
    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome>;

    /// Block until the presentation queue is idle.
    fn wait_present_idle(&mut self) -> Result<()>;

    /// Block until the whole device is idle.
    fn wait_device_idle(&mut self) -> Result<()>;

    fn free_command_buffers(&mut self);
    fn destroy_framebuffers(&mut self);
    fn destroy_image_views(&mut self);
    fn destroy_render_pass(&mut self);
    fn destroy_swapchain(&mut self);

    fn create_render_pass(&mut self) -> Result<()>;
    fn create_swapchain(&mut self, framebuffer_size: (u32, u32)) -> Result<()>;
    fn create_image_views(&mut self) -> Result<()>;
    fn create_framebuffers(&mut self) -> Result<()>;
    fn allocate_command_buffers(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_optimal_presents_skip_rebuild() {
        assert!(!PresentOutcome::Optimal.needs_rebuild());
        assert!(PresentOutcome::Suboptimal.needs_rebuild());
        assert!(PresentOutcome::OutOfDate.needs_rebuild());
    }
}
