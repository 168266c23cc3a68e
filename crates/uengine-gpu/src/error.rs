//! GPU error types.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

/// GPU-related errors.
///
/// Every variant is fatal for the frame loop. Recoverable presentation
/// states (out-of-date, suboptimal) are reported through
/// [`AcquireOutcome`](crate::backend::AcquireOutcome) and
/// [`PresentOutcome`](crate::backend::PresentOutcome) instead.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// Vulkan loader could not be found or initialized.
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// No physical device satisfies the device requirements.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// No memory type matches the requested type bits and properties.
    #[error("No suitable memory type (type bits {type_bits:#b}, properties {properties:?})")]
    NoSuitableMemory {
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    },

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Shader module could not be created from the given bytes.
    #[error("Invalid shader module: {0}")]
    ShaderModule(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// Reading a file from disk failed.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Decoding an image file failed.
    #[error("Failed to decode texture {path}: {source}")]
    TextureDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The requested image layout transition has no barrier masks.
    #[error("Unsupported layout transition: {from:?} -> {to:?}")]
    UnsupportedLayoutTransition {
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    },

    /// The UI renderer failed.
    #[error("UI renderer error: {0}")]
    Ui(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

/// Log an error raised while dropping GPU objects, where it cannot be
/// propagated. Returns whether the step succeeded.
pub(crate) fn log_teardown<E: std::fmt::Display>(
    step: &str,
    result: std::result::Result<(), E>,
) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("{step} failed during teardown: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teardown_failures_are_reported() {
        assert!(log_teardown::<vk::Result>("Device wait idle", Ok(())));
        assert!(!log_teardown(
            "Device wait idle",
            Err(vk::Result::ERROR_DEVICE_LOST)
        ));
        assert!(!log_teardown(
            "Device wait idle",
            Err(GpuError::InvalidState("lost".into()))
        ));
    }
}
