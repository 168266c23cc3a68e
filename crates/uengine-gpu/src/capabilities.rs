//! Physical device description used for logging and sampler limits.

use ash::vk;

/// Anisotropy requested for texture samplers before device clamping.
pub const PREFERRED_ANISOTROPY: f32 = 16.0;

/// Properties of the selected GPU.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    pub device_name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    /// Sum of all device-local heaps, in MiB
    pub device_local_memory_mb: u64,
    pub max_sampler_anisotropy: f32,
    pub max_image_dimension_2d: u32,
}

impl GpuCapabilities {
    /// Read the capabilities of `physical_device`.
    ///
    /// # Safety
    /// The physical device must belong to `instance`.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let (properties, memory_properties) = unsafe {
            (
                instance.get_physical_device_properties(physical_device),
                instance.get_physical_device_memory_properties(physical_device),
            )
        };
        Self::from_properties(&properties, &memory_properties)
    }

    pub fn from_properties(
        properties: &vk::PhysicalDeviceProperties,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
    ) -> Self {
        let heaps = &memory_properties.memory_heaps[..memory_properties.memory_heap_count as usize];
        let local_bytes: u64 = heaps
            .iter()
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum();

        Self {
            device_name: properties.device_name_as_c_str().map_or_else(
                |_| "<unnamed>".to_string(),
                |name| name.to_string_lossy().into_owned(),
            ),
            device_type: properties.device_type,
            api_version: properties.api_version,
            device_local_memory_mb: local_bytes >> 20,
            max_sampler_anisotropy: properties.limits.max_sampler_anisotropy,
            max_image_dimension_2d: properties.limits.max_image_dimension2_d,
        }
    }

    /// `requested` anisotropy limited to what the device supports.
    pub fn clamp_anisotropy(&self, requested: f32) -> f32 {
        requested.min(self.max_sampler_anisotropy).max(1.0)
    }

    /// One-line description for the startup log.
    pub fn summary(&self) -> String {
        format!(
            "{} [{:?}] Vulkan {}.{}, {} MiB local",
            self.device_name,
            self.device_type,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            self.device_local_memory_mb,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn heaps(sizes: &[(u64, vk::MemoryHeapFlags)]) -> vk::PhysicalDeviceMemoryProperties {
        let mut memory = vk::PhysicalDeviceMemoryProperties {
            memory_heap_count: sizes.len() as u32,
            ..Default::default()
        };
        for (heap, &(mb, flags)) in memory.memory_heaps.iter_mut().zip(sizes) {
            *heap = vk::MemoryHeap {
                size: mb << 20,
                flags,
            };
        }
        memory
    }

    #[test]
    fn only_device_local_heaps_are_counted() {
        let memory = heaps(&[
            (4096, vk::MemoryHeapFlags::DEVICE_LOCAL),
            (8192, vk::MemoryHeapFlags::empty()),
            (256, vk::MemoryHeapFlags::DEVICE_LOCAL),
        ]);
        let mut properties = vk::PhysicalDeviceProperties {
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            api_version: vk::make_api_version(0, 1, 3, 250),
            ..Default::default()
        };
        properties.limits.max_sampler_anisotropy = 16.0;

        let caps = GpuCapabilities::from_properties(&properties, &memory);
        assert_eq!(caps.device_local_memory_mb, 4352);
        assert!(caps.summary().contains("Vulkan 1.3"));
        assert!(caps.summary().contains("4352 MiB"));
    }

    #[test]
    fn anisotropy_is_clamped_to_the_device_limit() {
        let mut properties = vk::PhysicalDeviceProperties::default();
        properties.limits.max_sampler_anisotropy = 8.0;
        let caps = GpuCapabilities::from_properties(&properties, &heaps(&[]));
        assert_relative_eq!(caps.clamp_anisotropy(PREFERRED_ANISOTROPY), 8.0);
        assert_relative_eq!(caps.clamp_anisotropy(0.0), 1.0);
    }
}
