//! [`RenderBackend`] over a real Vulkan device.

use crate::backend::{AcquireOutcome, PresentOutcome, RenderBackend};
use crate::command::{begin_command_buffer, submit_command_buffer, CommandPool};
use crate::context::GpuContext;
use crate::error::{log_teardown, GpuError, Result};
use crate::frame::MAX_FRAMES_IN_FLIGHT;
use crate::swapchain::SwapchainManager;
use crate::sync::{reset_fence, wait_for_fence, FrameSync};
use ash::vk;
use std::sync::Arc;

/// Swapchain, per-slot command buffers and synchronization objects.
pub struct VulkanBackend {
    ctx: Arc<GpuContext>,
    swapchain: SwapchainManager,
    command_pool: CommandPool,
    command_buffers: Vec<vk::CommandBuffer>,
    slots: Vec<FrameSync>,
}

impl VulkanBackend {
    /// Build the presentation state for a window of `framebuffer_size`.
    pub fn new(ctx: Arc<GpuContext>, framebuffer_size: (u32, u32)) -> Result<Self> {
        let mut swapchain = SwapchainManager::new(ctx.clone());
        swapchain.build(framebuffer_size)?;

        let command_pool = CommandPool::new(
            &ctx,
            ctx.queue_families().graphics,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let slots = FrameSync::create_slots(&ctx, MAX_FRAMES_IN_FLIGHT)?;

        let mut backend = Self {
            ctx,
            swapchain,
            command_pool,
            command_buffers: Vec::new(),
            slots,
        };
        backend.allocate_command_buffers()?;
        Ok(backend)
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    pub fn swapchain(&self) -> &SwapchainManager {
        &self.swapchain
    }


    fn slot(&self, slot: usize) -> Result<&FrameSync> {
        self.slots
            .get(slot)
            .ok_or_else(|| GpuError::InvalidState(format!("frame slot {slot} out of range")))
    }

    fn command_buffer(&self, slot: usize) -> Result<vk::CommandBuffer> {
        self.command_buffers.get(slot).copied().ok_or_else(|| {
            GpuError::InvalidState(format!("no command buffer for frame slot {slot}"))
        })
    }
}

impl RenderBackend for VulkanBackend {
    fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    fn present_render_pass(&self) -> Result<vk::RenderPass> {
        self.swapchain.render_pass()
    }

    fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        wait_for_fence(self.ctx.device(), self.slot(slot)?.in_flight.raw())
    }

    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
        let semaphore = self.slot(slot)?.image_available.raw();
        self.swapchain.acquire_next_image(semaphore)
    }

    fn begin_commands(&mut self, slot: usize) -> Result<vk::CommandBuffer> {
        let cmd = self.command_buffer(slot)?;
        let device = self.ctx.device();
        unsafe {
            device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::empty())?;
        }
        Ok(cmd)
    }

    fn begin_present_pass(
        &mut self,
        slot: usize,
        image_index: u32,
        clear_color: [f32; 4],
    ) -> Result<()> {
        let cmd = self.command_buffer(slot)?;
        // SAFETY: begin_commands left `cmd` recording outside a render pass.
        unsafe { self.swapchain.begin_render_pass(cmd, image_index, clear_color) }
    }

    fn end_present_pass(&mut self, slot: usize) -> Result<()> {
        let cmd = self.command_buffer(slot)?;
        unsafe { self.ctx.device().cmd_end_render_pass(cmd) };
        Ok(())
    }

    fn end_commands(&mut self, slot: usize) -> Result<()> {
        let cmd = self.command_buffer(slot)?;
        unsafe { self.ctx.device().end_command_buffer(cmd)? };
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let cmd = self.command_buffer(slot)?;
        let sync = self.slot(slot)?;
        let device = self.ctx.device();

        reset_fence(device, sync.in_flight.raw())?;
        unsafe {
            submit_command_buffer(
                device,
                self.ctx.graphics_queue(),
                cmd,
                &[sync.image_available.raw()],
                &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
                &[sync.render_finished.raw()],
                sync.in_flight.raw(),
            )
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
        let wait = self.slot(slot)?.render_finished.raw();
        self.swapchain.present(image_index, wait)
    }

    fn wait_present_idle(&mut self) -> Result<()> {
        unsafe { self.ctx.device().queue_wait_idle(self.ctx.present_queue())? };
        Ok(())
    }

    fn wait_device_idle(&mut self) -> Result<()> {
        self.ctx.wait_idle()
    }

    fn free_command_buffers(&mut self) {
        let buffers = std::mem::take(&mut self.command_buffers);
        // SAFETY: rebuilds and drop wait for the device first.
        unsafe { self.command_pool.free(&buffers) };
    }

    fn destroy_framebuffers(&mut self) {
        self.swapchain.destroy_framebuffers();
    }

    fn destroy_image_views(&mut self) {
        self.swapchain.destroy_image_views();
    }

    fn destroy_render_pass(&mut self) {
        self.swapchain.destroy_render_pass();
    }

    fn destroy_swapchain(&mut self) {
        self.swapchain.destroy_swapchain();
    }

    fn create_render_pass(&mut self) -> Result<()> {
        self.swapchain.create_render_pass()
    }

    fn create_swapchain(&mut self, framebuffer_size: (u32, u32)) -> Result<()> {
        self.swapchain.create_swapchain(framebuffer_size)
    }

    fn create_image_views(&mut self) -> Result<()> {
        self.swapchain.create_image_views()
    }

    fn create_framebuffers(&mut self) -> Result<()> {
        self.swapchain.create_framebuffers()?;
        debug_assert!(self.swapchain.is_consistent());
        Ok(())
    }

    fn allocate_command_buffers(&mut self) -> Result<()> {
        self.command_buffers = self.command_pool.allocate(MAX_FRAMES_IN_FLIGHT as u32)?;
        Ok(())
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        log_teardown("Device wait idle", self.ctx.wait_idle());
        self.free_command_buffers();
    }
}
