//! Descriptor set layouts, pools and writes.

use crate::context::GpuContext;
use crate::error::Result;
use crate::handle::Owned;
use ash::vk;
use std::sync::Arc;

/// Descriptors of each type reserved in the UI pool.
pub const UI_DESCRIPTORS_PER_TYPE: u32 = 1000;

/// Descriptor set layout builder.
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
}

impl DescriptorSetLayoutBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding.
    #[must_use]
    pub fn binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(count)
                .stage_flags(stage_flags),
        );
        self
    }

    /// Add a uniform buffer binding.
    #[must_use]
    pub fn uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::UNIFORM_BUFFER, 1, stage_flags)
    }

    /// Add a combined image sampler binding.
    #[must_use]
    pub fn sampled_image(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            1,
            stage_flags,
        )
    }

    /// Bindings added so far.
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding<'static>] {
        &self.bindings
    }

    /// Pool sizes needed to allocate `sets` sets of this layout.
    pub fn pool_sizes(&self, sets: u32) -> Vec<vk::DescriptorPoolSize> {
        let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
        for binding in &self.bindings {
            let count = binding.descriptor_count * sets;
            match sizes.iter_mut().find(|s| s.ty == binding.descriptor_type) {
                Some(size) => size.descriptor_count += count,
                None => sizes.push(vk::DescriptorPoolSize {
                    ty: binding.descriptor_type,
                    descriptor_count: count,
                }),
            }
        }
        sizes
    }

    /// Build the descriptor set layout.
    pub fn build(&self, ctx: &Arc<GpuContext>) -> Result<Owned<vk::DescriptorSetLayout>> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);

        let layout = unsafe { ctx.device().create_descriptor_set_layout(&layout_info, None)? };
        // SAFETY: just created from this device.
        Ok(unsafe { Owned::from_raw(ctx.clone(), layout) })
    }
}

/// Descriptor pool whose sets can be freed individually.
pub struct DescriptorPool {
    pool: Owned<vk::DescriptorPool>,
}

impl DescriptorPool {
    /// Create a new descriptor pool.
    pub fn new(
        ctx: &Arc<GpuContext>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);

        let pool = unsafe { ctx.device().create_descriptor_pool(&create_info, None)? };
        // SAFETY: just created from this device.
        Ok(Self {
            pool: unsafe { Owned::from_raw(ctx.clone(), pool) },
        })
    }

    /// Pool sized for an immediate-mode UI backend.
    pub fn for_ui(ctx: &Arc<GpuContext>) -> Result<Self> {
        let sizes = ui_pool_sizes();
        Self::new(ctx, UI_DESCRIPTORS_PER_TYPE * sizes.len() as u32, &sizes)
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool.raw()
    }

    /// Allocate one set per entry in `layouts`.
    pub fn allocate(&self, layouts: &[vk::DescriptorSetLayout]) -> Result<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool.raw())
            .set_layouts(layouts);

        Ok(unsafe {
            self.pool
                .context()
                .device()
                .allocate_descriptor_sets(&alloc_info)?
        })
    }

    /// Return sets to the pool.
    ///
    /// # Safety
    /// The sets must come from this pool and must not be in use by the GPU.
    pub unsafe fn free(&self, sets: &[vk::DescriptorSet]) -> Result<()> {
        unsafe {
            self.pool
                .context()
                .device()
                .free_descriptor_sets(self.pool.raw(), sets)?;
        }
        Ok(())
    }
}

/// One entry per classic descriptor type, [`UI_DESCRIPTORS_PER_TYPE`] each.
pub fn ui_pool_sizes() -> [vk::DescriptorPoolSize; 11] {
    [
        vk::DescriptorType::SAMPLER,
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        vk::DescriptorType::SAMPLED_IMAGE,
        vk::DescriptorType::STORAGE_IMAGE,
        vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
        vk::DescriptorType::STORAGE_TEXEL_BUFFER,
        vk::DescriptorType::UNIFORM_BUFFER,
        vk::DescriptorType::STORAGE_BUFFER,
        vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
        vk::DescriptorType::INPUT_ATTACHMENT,
    ]
    .map(|ty| vk::DescriptorPoolSize {
        ty,
        descriptor_count: UI_DESCRIPTORS_PER_TYPE,
    })
}

/// Write a uniform buffer descriptor.
///
/// # Safety
/// Device and buffer must be valid, and the set must not be in use.
pub unsafe fn write_uniform_buffer(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    buffer: vk::Buffer,
    offset: u64,
    range: u64,
) {
    let buffer_info = vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(offset)
        .range(range);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .buffer_info(std::slice::from_ref(&buffer_info));

    unsafe { device.update_descriptor_sets(&[write], &[]) };
}

/// Write a combined image sampler descriptor in shader-read-only layout.
///
/// # Safety
/// Device, view and sampler must be valid, and the set must not be in use.
pub unsafe fn write_combined_image_sampler(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    image_view: vk::ImageView,
    sampler: vk::Sampler,
) {
    let image_info = vk::DescriptorImageInfo::default()
        .image_view(image_view)
        .sampler(sampler)
        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .image_info(std::slice::from_ref(&image_info));

    unsafe { device.update_descriptor_sets(&[write], &[]) };
}
