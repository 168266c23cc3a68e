//! Resource factory.
//!
//! Every method returns an owning wrapper; the handle is destroyed when the
//! wrapper drops. Uploads go through single-use command buffers on the
//! graphics queue and block until the queue is idle.

use crate::command::CommandPool;
use crate::context::GpuContext;
use crate::descriptors::{DescriptorPool, DescriptorSetLayoutBuilder};
use crate::error::Result;
use crate::handle::Owned;
use crate::memory::{self, Buffer, Image};
use crate::pipeline::{self, GraphicsPipeline, GraphicsPipelineDesc};
use crate::texture::{record_layout_transition, Texture, TextureData};
use ash::vk;
use std::path::Path;
use std::sync::Arc;

/// Creates GPU resources bound to one context.
#[derive(Clone)]
pub struct ResourceFactory {
    ctx: Arc<GpuContext>,
    upload_pool: Arc<CommandPool>,
}

impl ResourceFactory {
    pub fn new(ctx: Arc<GpuContext>) -> Result<Self> {
        let upload_pool = CommandPool::new(
            &ctx,
            ctx.queue_families().graphics,
            vk::CommandPoolCreateFlags::TRANSIENT,
        )?;
        Ok(Self {
            ctx,
            upload_pool: Arc::new(upload_pool),
        })
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    /// Index of the first memory type allowed by `type_bits` with `properties`.
    pub fn find_memory_type(&self, type_bits: u32, properties: vk::MemoryPropertyFlags) -> Result<u32> {
        memory::find_memory_type(self.ctx.memory_properties(), type_bits, properties)
    }

    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Buffer> {
        Buffer::new(&self.ctx, size, usage, properties)
    }

    /// Host-visible, coherent buffer filled with `data`.
    pub fn create_buffer_with_data<T: bytemuck::Pod>(
        &self,
        data: &[T],
        usage: vk::BufferUsageFlags,
    ) -> Result<Buffer> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let buffer = self.create_buffer(
            bytes.len() as vk::DeviceSize,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        buffer.write_bytes(bytes)?;
        Ok(buffer)
    }

    pub fn create_image(
        &self,
        create_info: &vk::ImageCreateInfo<'_>,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Image> {
        Image::new(&self.ctx, create_info, properties)
    }

    pub fn create_image_view(&self, create_info: &vk::ImageViewCreateInfo<'_>) -> Result<Owned<vk::ImageView>> {
        let view = unsafe { self.ctx.device().create_image_view(create_info, None)? };
        // SAFETY: just created from this device.
        Ok(unsafe { Owned::from_raw(self.ctx.clone(), view) })
    }

    pub fn create_sampler(&self, create_info: &vk::SamplerCreateInfo<'_>) -> Result<Owned<vk::Sampler>> {
        let sampler = unsafe { self.ctx.device().create_sampler(create_info, None)? };
        // SAFETY: just created from this device.
        Ok(unsafe { Owned::from_raw(self.ctx.clone(), sampler) })
    }

    pub fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<DescriptorPool> {
        DescriptorPool::new(&self.ctx, max_sets, pool_sizes)
    }

    pub fn create_descriptor_set_layout(
        &self,
        builder: &DescriptorSetLayoutBuilder,
    ) -> Result<Owned<vk::DescriptorSetLayout>> {
        builder.build(&self.ctx)
    }

    /// Apply descriptor writes and copies.
    ///
    /// # Safety
    /// Every referenced set must be unused by pending GPU work.
    pub unsafe fn update_descriptor_sets(
        &self,
        writes: &[vk::WriteDescriptorSet<'_>],
        copies: &[vk::CopyDescriptorSet<'_>],
    ) {
        unsafe { self.ctx.device().update_descriptor_sets(writes, copies) };
    }

    pub fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Owned<vk::PipelineLayout>> {
        pipeline::create_pipeline_layout(&self.ctx, set_layouts, push_constant_ranges)
    }

    pub fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc,
        render_pass: vk::RenderPass,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<GraphicsPipeline> {
        GraphicsPipeline::new(&self.ctx, desc, render_pass, set_layouts, push_constant_ranges)
    }

    /// Shader module from SPIR-V bytes.
    pub fn create_shader_module(&self, spirv: &[u8]) -> Result<Owned<vk::ShaderModule>> {
        pipeline::create_shader_module(&self.ctx, &pipeline::spirv_words(spirv)?)
    }

    pub fn create_shader_module_from_file(&self, path: impl AsRef<Path>) -> Result<Owned<vk::ShaderModule>> {
        self.create_shader_module(&pipeline::read_file(path)?)
    }

    pub fn create_render_pass(&self, create_info: &vk::RenderPassCreateInfo<'_>) -> Result<Owned<vk::RenderPass>> {
        let render_pass = unsafe { self.ctx.device().create_render_pass(create_info, None)? };
        // SAFETY: just created from this device.
        Ok(unsafe { Owned::from_raw(self.ctx.clone(), render_pass) })
    }

    pub fn create_framebuffer(&self, create_info: &vk::FramebufferCreateInfo<'_>) -> Result<Owned<vk::Framebuffer>> {
        let framebuffer = unsafe { self.ctx.device().create_framebuffer(create_info, None)? };
        // SAFETY: just created from this device.
        Ok(unsafe { Owned::from_raw(self.ctx.clone(), framebuffer) })
    }

    /// Decode an image file and upload it as a sampled texture.
    pub fn load_texture(&self, path: impl AsRef<Path>, keep_pixels: bool) -> Result<Texture> {
        let path = path.as_ref();
        let data = TextureData::load(path)?;
        tracing::debug!(
            path = %path.display(),
            width = data.width(),
            height = data.height(),
            "Loaded texture"
        );
        Texture::upload(self, data, keep_pixels)
    }

    /// Record `f` into a single-use command buffer and wait for it.
    pub fn execute_single_time<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
    {
        self.upload_pool
            .execute_single_time(self.ctx.graphics_queue(), f)
    }

    /// Transition a color image between the layouts used by uploads.
    pub fn transition_image_layout(
        &self,
        image: vk::Image,
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    ) -> Result<()> {
        self.execute_single_time(|device, cmd| unsafe {
            record_layout_transition(device, cmd, image, from, to)
        })
    }

    /// Copy tightly packed pixels from `buffer` into `image`, which must be in
    /// `TRANSFER_DST_OPTIMAL` layout.
    pub fn copy_buffer_to_image(
        &self,
        buffer: vk::Buffer,
        image: vk::Image,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let region = buffer_image_copy(width, height);
        self.execute_single_time(|device, cmd| {
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    buffer,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }
            Ok(())
        })
    }

    /// Copy `size` bytes between buffers.
    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) -> Result<()> {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        self.execute_single_time(|device, cmd| {
            unsafe { device.cmd_copy_buffer(cmd, src, dst, &[region]) };
            Ok(())
        })
    }
}

/// Whole-image copy region for tightly packed rows.
pub fn buffer_image_copy(width: u32, height: u32) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D::default(),
        image_extent: vk::Extent3D {
            width,
            height,
            depth: 1,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_region_covers_whole_image() {
        let region = buffer_image_copy(64, 32);
        assert_eq!(region.buffer_offset, 0);
        assert_eq!(region.buffer_row_length, 0);
        assert_eq!(region.image_subresource.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(region.image_subresource.layer_count, 1);
        assert_eq!(
            (region.image_extent.width, region.image_extent.height, region.image_extent.depth),
            (64, 32, 1)
        );
    }
}
