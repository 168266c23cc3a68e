//! Owning wrappers for raw Vulkan handles.
//!
//! [`Owned<T>`] pairs a handle with the context that created it and runs the
//! matching `vkDestroy*`/`vkFree*` call exactly once when dropped.

use crate::context::GpuContext;
use ash::vk;
use std::fmt;
use std::sync::Arc;

/// A device-level handle that can be destroyed with the logical device.
pub trait DeviceObject: vk::Handle + Copy {
    /// Destroy the handle.
    ///
    /// # Safety
    /// The handle must have been created by `device`, must not be in use by
    /// the GPU, and must not be destroyed again.
    unsafe fn destroy(self, device: &ash::Device);
}

macro_rules! device_object {
    ($($ty:ty => $destroy:ident),* $(,)?) => {
        $(
            impl DeviceObject for $ty {
                unsafe fn destroy(self, device: &ash::Device) {
                    unsafe { device.$destroy(self, None) };
                }
            }
        )*
    };
}

device_object! {
    vk::Buffer => destroy_buffer,
    vk::DeviceMemory => free_memory,
    vk::Image => destroy_image,
    vk::ImageView => destroy_image_view,
    vk::Sampler => destroy_sampler,
    vk::DescriptorPool => destroy_descriptor_pool,
    vk::DescriptorSetLayout => destroy_descriptor_set_layout,
    vk::PipelineLayout => destroy_pipeline_layout,
    vk::Pipeline => destroy_pipeline,
    vk::ShaderModule => destroy_shader_module,
    vk::Framebuffer => destroy_framebuffer,
    vk::RenderPass => destroy_render_pass,
    vk::Semaphore => destroy_semaphore,
    vk::Fence => destroy_fence,
    vk::CommandPool => destroy_command_pool,
}

/// A Vulkan handle destroyed when this value is dropped.
pub struct Owned<T: DeviceObject> {
    ctx: Arc<GpuContext>,
    handle: T,
}

impl<T: DeviceObject> Owned<T> {
    /// Take ownership of `handle`.
    ///
    /// # Safety
    /// `handle` must have been created from `ctx.device()` and must not be
    /// owned by anything else.
    pub unsafe fn from_raw(ctx: Arc<GpuContext>, handle: T) -> Self {
        Self { ctx, handle }
    }

    /// The raw handle. Valid for as long as `self` is alive.
    pub fn raw(&self) -> T {
        self.handle
    }

    /// Context that owns the underlying device.
    pub fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    /// Give up ownership; the caller becomes responsible for destroying it.
    pub fn into_raw(self) -> T {
        let this = std::mem::ManuallyDrop::new(self);
        // SAFETY: `ctx` is moved out exactly once and `this` is never dropped,
        // so the context reference is released without destroying the handle.
        drop(unsafe { std::ptr::read(&this.ctx) });
        this.handle
    }
}

impl<T: DeviceObject> Drop for Owned<T> {
    fn drop(&mut self) {
        // SAFETY: the handle came from this device and ownership is unique.
        unsafe { self.handle.destroy(self.ctx.device()) };
    }
}

impl<T: DeviceObject + fmt::Debug> fmt::Debug for Owned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owned").field(&self.handle).finish()
    }
}
