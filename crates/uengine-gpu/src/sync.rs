//! Synchronization primitives.

use crate::context::GpuContext;
use crate::error::Result;
use crate::handle::Owned;
use ash::vk;
use std::sync::Arc;

/// Create a semaphore.
pub fn create_semaphore(ctx: &Arc<GpuContext>) -> Result<Owned<vk::Semaphore>> {
    let create_info = vk::SemaphoreCreateInfo::default();
    let semaphore = unsafe { ctx.device().create_semaphore(&create_info, None)? };
    // SAFETY: just created from this device.
    Ok(unsafe { Owned::from_raw(ctx.clone(), semaphore) })
}

/// Create a fence.
pub fn create_fence(ctx: &Arc<GpuContext>, signaled: bool) -> Result<Owned<vk::Fence>> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    let fence = unsafe { ctx.device().create_fence(&create_info, None)? };
    // SAFETY: just created from this device.
    Ok(unsafe { Owned::from_raw(ctx.clone(), fence) })
}

/// Block until `fence` is signaled. There is no timeout; a driver-reported
/// timeout is returned as an error.
pub fn wait_for_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    unsafe { device.wait_for_fences(&[fence], true, u64::MAX)? };
    Ok(())
}

/// Reset a fence to unsignaled state.
pub fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    unsafe { device.reset_fences(&[fence])? };
    Ok(())
}

/// Per-slot synchronization objects.
pub struct FrameSync {
    /// Signaled when the acquired image may be rendered to
    pub image_available: Owned<vk::Semaphore>,
    /// Signaled when the slot's commands finish; presentation waits on it
    pub render_finished: Owned<vk::Semaphore>,
    /// Signaled when the slot's submission completes; created signaled
    pub in_flight: Owned<vk::Fence>,
}

impl FrameSync {
    /// Create frame synchronization resources.
    pub fn new(ctx: &Arc<GpuContext>) -> Result<Self> {
        Ok(Self {
            image_available: create_semaphore(ctx)?,
            render_finished: create_semaphore(ctx)?,
            in_flight: create_fence(ctx, true)?,
        })
    }

    /// Create `count` independent slots.
    pub fn create_slots(ctx: &Arc<GpuContext>, count: usize) -> Result<Vec<Self>> {
        (0..count).map(|_| Self::new(ctx)).collect()
    }
}
