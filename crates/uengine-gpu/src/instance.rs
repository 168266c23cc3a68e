//! Vulkan instance creation.

use crate::error::{GpuError, Result};
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};

/// Validation layer requested when diagnostics are enabled.
pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Created instance plus whether the validation layer made it in.
pub struct InstanceBundle {
    pub instance: ash::Instance,
    pub validation_enabled: bool,
}

/// Return the names in `requested` that are missing from `available`.
pub fn missing_names<'a>(requested: &[&'a CStr], available: &[&CStr]) -> Vec<&'a CStr> {
    requested
        .iter()
        .copied()
        .filter(|name| !available.contains(name))
        .collect()
}

/// Create a Vulkan instance able to present to `display`.
///
/// A missing validation layer is reported and skipped rather than failing.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    display: RawDisplayHandle,
    enable_validation: bool,
) -> Result<InstanceBundle> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::InvalidState(format!("Invalid application name: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(c"uengine")
        .engine_version(vk::make_api_version(0, 1, 0, 0))
        .api_version(vk::API_VERSION_1_0);

    let mut extension_names: Vec<*const c_char> = ash_window::enumerate_required_extensions(display)
        .map_err(|e| GpuError::SurfaceCreation(format!("Unsupported display: {e}")))?
        .to_vec();

    #[cfg(target_os = "macos")]
    extension_names.push(ash::khr::portability_enumeration::NAME.as_ptr());

    let validation_enabled = enable_validation && {
        let available = unsafe { entry.enumerate_instance_layer_properties()? };
        let names: Vec<&CStr> = available
            .iter()
            .filter_map(|props| props.layer_name_as_c_str().ok())
            .collect();
        let missing = missing_names(&[VALIDATION_LAYER], &names);
        for layer in &missing {
            tracing::warn!("Validation layer {} not available", layer.to_string_lossy());
        }
        missing.is_empty()
    };

    let layer_names: Vec<*const c_char> = if validation_enabled {
        extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    let instance = unsafe { entry.create_instance(&create_info, None)? };

    Ok(InstanceBundle {
        instance,
        validation_enabled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_names_reports_only_absent_entries() {
        let available = [c"VK_LAYER_KHRONOS_validation", c"VK_LAYER_MESA_overlay"];
        assert!(missing_names(&[VALIDATION_LAYER], &available).is_empty());

        let missing = missing_names(&[VALIDATION_LAYER, c"VK_LAYER_other"], &available[1..]);
        assert_eq!(missing, vec![VALIDATION_LAYER, c"VK_LAYER_other"]);
    }
}
