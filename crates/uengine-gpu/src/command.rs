//! Command pools, command buffer recording and single-use submissions.

use crate::context::GpuContext;
use crate::error::Result;
use crate::handle::Owned;
use ash::vk;
use std::sync::Arc;

/// Command pool for allocating command buffers.
pub struct CommandPool {
    pool: Owned<vk::CommandPool>,
    queue_family: u32,
}

impl CommandPool {
    /// Create a command pool on `queue_family`.
    pub fn new(
        ctx: &Arc<GpuContext>,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        let pool = unsafe { ctx.device().create_command_pool(&create_info, None)? };
        // SAFETY: just created from this device.
        let pool = unsafe { Owned::from_raw(ctx.clone(), pool) };

        Ok(Self { pool, queue_family })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool.raw()
    }

    /// Get the queue family index.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate `count` primary command buffers.
    pub fn allocate(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool.raw())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        Ok(unsafe { self.pool.context().device().allocate_command_buffers(&alloc_info)? })
    }

    /// Return command buffers to the pool.
    ///
    /// # Safety
    /// The buffers must come from this pool and must not be pending execution.
    pub unsafe fn free(&self, command_buffers: &[vk::CommandBuffer]) {
        if command_buffers.is_empty() {
            return;
        }
        unsafe {
            self.pool
                .context()
                .device()
                .free_command_buffers(self.pool.raw(), command_buffers);
        }
    }

    /// Record `f` into a fresh command buffer, submit it to `queue`, and
    /// block until the queue is idle.
    ///
    /// The command buffer is freed whether or not recording succeeds.
    pub fn execute_single_time<F>(&self, queue: vk::Queue, f: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
    {
        let device = self.pool.context().device();
        let cmd = self.allocate(1)?[0];

        let result = (|| {
            unsafe {
                begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
            }
            f(device, cmd)?;
            unsafe {
                device.end_command_buffer(cmd)?;
                let cmd_buffers = [cmd];
                let submit_info = vk::SubmitInfo::default().command_buffers(&cmd_buffers);
                device.queue_submit(queue, &[submit_info], vk::Fence::null())?;
                device.queue_wait_idle(queue)?;
            }
            Ok(())
        })();

        // SAFETY: either never submitted or the queue has drained.
        unsafe { self.free(&[cmd]) };
        result
    }
}

/// Begin recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
    unsafe { device.begin_command_buffer(cmd, &begin_info)? };
    Ok(())
}

/// Submit one command buffer to a queue.
///
/// # Safety
/// All handles must be valid.
pub unsafe fn submit_command_buffer(
    device: &ash::Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    wait_semaphores: &[vk::Semaphore],
    wait_stages: &[vk::PipelineStageFlags],
    signal_semaphores: &[vk::Semaphore],
    fence: vk::Fence,
) -> Result<()> {
    let command_buffers = [cmd];
    let submit_info = vk::SubmitInfo::default()
        .command_buffers(&command_buffers)
        .wait_semaphores(wait_semaphores)
        .wait_dst_stage_mask(wait_stages)
        .signal_semaphores(signal_semaphores);

    unsafe { device.queue_submit(queue, &[submit_info], fence)? };
    Ok(())
}
