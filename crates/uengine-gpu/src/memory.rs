//! Device memory selection and memory-backed buffers and images.
//!
//! Each buffer or image gets its own `vkAllocateMemory` allocation, bound at
//! offset 0 right after allocation.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::handle::Owned;
use ash::vk;
use bytemuck::Pod;
use std::ffi::c_void;
use std::sync::Arc;

/// Find the first memory type allowed by `type_bits` whose property flags
/// contain `required`.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32> {
    memory_properties
        .memory_types
        .iter()
        .take(memory_properties.memory_type_count as usize)
        .zip(0u32..)
        .find(|&(memory_type, i)| {
            type_bits & (1u32 << i) != 0 && memory_type.property_flags.contains(required)
        })
        .map(|(_, i)| i)
        .ok_or(GpuError::NoSuitableMemory {
            type_bits,
            properties: required,
        })
}

/// Allocate memory satisfying `requirements` and `properties`.
fn allocate(
    ctx: &Arc<GpuContext>,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> Result<Owned<vk::DeviceMemory>> {
    let memory_type_index = find_memory_type(
        ctx.memory_properties(),
        requirements.memory_type_bits,
        properties,
    )?;
    let alloc_info = vk::MemoryAllocateInfo::default()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    let memory = unsafe { ctx.device().allocate_memory(&alloc_info, None)? };
    // SAFETY: just allocated from this device.
    Ok(unsafe { Owned::from_raw(ctx.clone(), memory) })
}

/// A buffer with its own dedicated memory.
pub struct Buffer {
    // Field order matters: the buffer is destroyed before its memory is freed.
    buffer: Owned<vk::Buffer>,
    memory: Owned<vk::DeviceMemory>,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a buffer of `size` bytes backed by memory with `properties`.
    pub fn new(
        ctx: &Arc<GpuContext>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let device = ctx.device();
        let buffer = unsafe { device.create_buffer(&create_info, None)? };
        // SAFETY: just created from this device.
        let buffer = unsafe { Owned::from_raw(ctx.clone(), buffer) };

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer.raw()) };
        let memory = allocate(ctx, requirements, properties)?;
        unsafe { device.bind_buffer_memory(buffer.raw(), memory.raw(), 0)? };

        Ok(Self {
            buffer,
            memory,
            size,
        })
    }

    /// Raw buffer handle.
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.raw()
    }

    /// Raw memory handle.
    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory.raw()
    }

    /// Buffer size in bytes.
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Map the whole buffer.
    ///
    /// # Safety
    /// The memory must be host visible and not already mapped. The returned
    /// pointer is valid until [`Buffer::unmap`].
    pub unsafe fn map(&self) -> Result<*mut c_void> {
        let device = self.buffer.context().device();
        Ok(unsafe {
            device.map_memory(self.memory.raw(), 0, self.size, vk::MemoryMapFlags::empty())?
        })
    }

    /// Unmap a previous [`Buffer::map`].
    ///
    /// # Safety
    /// The memory must currently be mapped.
    pub unsafe fn unmap(&self) {
        unsafe { self.buffer.context().device().unmap_memory(self.memory.raw()) };
    }

    /// Copy `data` to the start of a host-visible, host-coherent buffer.
    pub fn write<T: Pod>(&self, data: &[T]) -> Result<()> {
        self.write_bytes(bytemuck::cast_slice(data))
    }

    /// Copy raw bytes to the start of a host-visible, host-coherent buffer.
    pub fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(GpuError::InvalidState(format!(
                "Write of {} bytes exceeds buffer size {}",
                bytes.len(),
                self.size
            )));
        }

        // SAFETY: the length was checked above and the mapping covers the
        // whole buffer.
        unsafe {
            let ptr = self.map()?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            self.unmap();
        }
        Ok(())
    }
}

/// An image with its own dedicated memory.
pub struct Image {
    image: Owned<vk::Image>,
    memory: Owned<vk::DeviceMemory>,
    format: vk::Format,
    extent: vk::Extent3D,
}

impl Image {
    /// Create an image from `create_info` backed by memory with `properties`.
    pub fn new(
        ctx: &Arc<GpuContext>,
        create_info: &vk::ImageCreateInfo<'_>,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let device = ctx.device();
        let image = unsafe { device.create_image(create_info, None)? };
        // SAFETY: just created from this device.
        let image = unsafe { Owned::from_raw(ctx.clone(), image) };

        let requirements = unsafe { device.get_image_memory_requirements(image.raw()) };
        let memory = allocate(ctx, requirements, properties)?;
        unsafe { device.bind_image_memory(image.raw(), memory.raw(), 0)? };

        Ok(Self {
            image,
            memory,
            format: create_info.format,
            extent: create_info.extent,
        })
    }

    /// Raw image handle.
    pub fn handle(&self) -> vk::Image {
        self.image.raw()
    }

    /// Raw memory handle.
    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory.raw()
    }

    /// Image format.
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Image extent.
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }
}

/// Create info for a single-mip, single-layer 2D image.
pub fn image_2d_info(
    width: u32,
    height: u32,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
) -> vk::ImageCreateInfo<'static> {
    vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width,
            height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
}
