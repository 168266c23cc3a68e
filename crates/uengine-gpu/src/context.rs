//! Device bootstrap and the shared GPU context.

use crate::capabilities::GpuCapabilities;
use crate::debug::{DebugMessenger, DiagnosticsSink, TracingDiagnostics};
use crate::error::{log_teardown, GpuError, Result};
use crate::instance::{create_instance, missing_names};
use crate::surface::Surface;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::CStr;

/// Device extensions every candidate must expose.
pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 1] = [ash::khr::swapchain::NAME];

/// Main GPU context holding the instance, surface and logical device.
///
/// Shared as `Arc<GpuContext>` by every resource owner, so it is destroyed
/// only after all of them are gone.
pub struct GpuContext {
    #[allow(dead_code)]
    entry: ash::Entry,
    instance: ash::Instance,
    debug: Option<DebugMessenger>,
    surface: Surface,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    swapchain_loader: ash::khr::swapchain::Device,
    queue_families: QueueFamilies,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    capabilities: GpuCapabilities,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get the presentation surface.
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Get the swapchain extension loader.
    pub fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    /// Get the graphics and presentation queue families.
    pub fn queue_families(&self) -> QueueFamilies {
        self.queue_families
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the presentation queue.
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Memory heaps and types of the selected device.
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Get GPU capabilities.
    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    /// Whether validation messages are being forwarded.
    pub fn diagnostics_enabled(&self) -> bool {
        self.debug.is_some()
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        // SAFETY: every owner holds an `Arc<GpuContext>`, so nothing created
        // from this device is still alive here.
        unsafe {
            log_teardown("Device wait idle", self.device.device_wait_idle());
            self.device.destroy_device(None);
            self.surface.destroy();
            if let Some(debug) = &self.debug {
                debug.destroy();
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
    diagnostics: Option<Box<dyn DiagnosticsSink>>,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "UEngine".to_string(),
            enable_validation: cfg!(debug_assertions),
            diagnostics: None,
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub const fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Route validation messages to `sink` instead of `tracing`.
    #[must_use]
    pub fn diagnostics(mut self, sink: Box<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    /// Build the GPU context for `window`.
    pub fn build<W>(self, window: &W) -> Result<GpuContext>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let entry =
            unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loading(e.to_string()))?;

        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?
            .as_raw();

        let bundle =
            unsafe { create_instance(&entry, &self.app_name, display, self.enable_validation)? };
        let instance = bundle.instance;

        let debug = if bundle.validation_enabled {
            let sink = self
                .diagnostics
                .unwrap_or_else(|| Box::new(TracingDiagnostics));
            match unsafe { DebugMessenger::new(&entry, &instance, sink) } {
                Ok(debug) => Some(debug),
                Err(e) => {
                    tracing::warn!("Failed to install debug messenger: {e}");
                    None
                }
            }
        } else {
            None
        };

        let surface = match unsafe { Surface::new(&entry, &instance, window) } {
            Ok(surface) => surface,
            Err(e) => {
                unsafe { destroy_partial(&instance, debug.as_ref(), None) };
                return Err(e);
            }
        };

        match unsafe { open_device(&instance, &surface) } {
            Ok(opened) => {
                let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &opened.device);
                tracing::info!("Selected GPU: {}", opened.capabilities.summary());
                tracing::debug!(
                    graphics = opened.queue_families.graphics,
                    present = opened.queue_families.present,
                    "Queue families"
                );
                Ok(GpuContext {
                    entry,
                    instance,
                    debug,
                    surface,
                    physical_device: opened.physical_device,
                    device: opened.device,
                    swapchain_loader,
                    queue_families: opened.queue_families,
                    graphics_queue: opened.graphics_queue,
                    present_queue: opened.present_queue,
                    memory_properties: opened.memory_properties,
                    capabilities: opened.capabilities,
                })
            }
            Err(e) => {
                unsafe { destroy_partial(&instance, debug.as_ref(), Some(&surface)) };
                Err(e)
            }
        }
    }
}

/// Tear down whatever was created before bootstrap failed.
unsafe fn destroy_partial(
    instance: &ash::Instance,
    debug: Option<&DebugMessenger>,
    surface: Option<&Surface>,
) {
    unsafe {
        if let Some(surface) = surface {
            surface.destroy();
        }
        if let Some(debug) = debug {
            debug.destroy();
        }
        instance.destroy_instance(None);
    }
}

/// Resolved graphics and presentation queue families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Queue family search in progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Scan `families` in order, stopping at the first index where both a
    /// graphics-capable and a present-capable family are known.
    pub fn find<F>(families: &[vk::QueueFamilyProperties], mut supports_present: F) -> Result<Self>
    where
        F: FnMut(u32) -> Result<bool>,
    {
        let mut indices = Self::default();

        for (i, family) in (0u32..).zip(families) {
            if supports_present(i)? {
                indices.present = Some(i);
            }
            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(i);
            }
            if indices.resolve().is_some() {
                break;
            }
        }

        Ok(indices)
    }

    /// Both families, if found.
    pub const fn resolve(&self) -> Option<QueueFamilies> {
        match (self.graphics, self.present) {
            (Some(graphics), Some(present)) => Some(QueueFamilies { graphics, present }),
            _ => None,
        }
    }
}

/// Device features the renderer depends on.
pub fn required_features_supported(features: &vk::PhysicalDeviceFeatures) -> bool {
    features.sampler_anisotropy == vk::TRUE && features.fill_mode_non_solid == vk::TRUE
}

struct OpenedDevice {
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue_families: QueueFamilies,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    capabilities: GpuCapabilities,
}

/// Pick the first suitable physical device and create the logical device.
unsafe fn open_device(instance: &ash::Instance, surface: &Surface) -> Result<OpenedDevice> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    let mut selected = None;
    for physical_device in devices {
        if let Some(families) = unsafe { check_device(instance, surface, physical_device)? } {
            selected = Some((physical_device, families));
            break;
        }
    }
    let (physical_device, queue_families) = selected.ok_or(GpuError::NoSuitableDevice)?;

    let device = unsafe { create_device(instance, physical_device, queue_families)? };
    let (graphics_queue, present_queue) = unsafe {
        (
            device.get_device_queue(queue_families.graphics, 0),
            device.get_device_queue(queue_families.present, 0),
        )
    };

    Ok(OpenedDevice {
        physical_device,
        device,
        queue_families,
        graphics_queue,
        present_queue,
        memory_properties: unsafe {
            instance.get_physical_device_memory_properties(physical_device)
        },
        capabilities: unsafe { GpuCapabilities::query(instance, physical_device) },
    })
}

/// Return the queue families of `physical_device` if it can run the renderer.
unsafe fn check_device(
    instance: &ash::Instance,
    surface: &Surface,
    physical_device: vk::PhysicalDevice,
) -> Result<Option<QueueFamilies>> {
    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
    let indices = QueueFamilyIndices::find(&families, |i| unsafe {
        surface.supports_present(physical_device, i)
    })?;
    let Some(queue_families) = indices.resolve() else {
        return Ok(None);
    };

    let extensions = unsafe { instance.enumerate_device_extension_properties(physical_device)? };
    let available: Vec<&CStr> = extensions
        .iter()
        .filter_map(|ext| ext.extension_name_as_c_str().ok())
        .collect();
    if !missing_names(&REQUIRED_DEVICE_EXTENSIONS, &available).is_empty() {
        return Ok(None);
    }

    if !unsafe { surface.support(physical_device)? }.is_adequate() {
        return Ok(None);
    }

    let features = unsafe { instance.get_physical_device_features(physical_device) };
    if !required_features_supported(&features) {
        return Ok(None);
    }

    Ok(Some(queue_families))
}

/// Create the logical device with one queue per unique family.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_families: QueueFamilies,
) -> Result<ash::Device> {
    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    let extension_names: Vec<*const std::ffi::c_char> = REQUIRED_DEVICE_EXTENSIONS
        .iter()
        .map(|ext| ext.as_ptr())
        .collect();

    let features = vk::PhysicalDeviceFeatures::default()
        .sampler_anisotropy(true)
        .fill_mode_non_solid(true);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .enabled_features(&features);

    let device = unsafe { instance.create_device(physical_device, &device_create_info, None)? };
    Ok(device)
}
