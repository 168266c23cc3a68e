//! Vulkan device and frame-scheduling layer for uengine.
//!
//! This crate provides:
//! - Instance, validation and device bootstrap
//! - Resource creation with owned handles
//! - Swapchain management and rebuilds
//! - Frame-slot synchronization
//! - Drawable registration and dispatch
//! - egui composition drawn into the swapchain pass

pub mod backend;
pub mod capabilities;
pub mod command;
pub mod context;
pub mod debug;
pub mod descriptors;
pub mod drawable;
pub mod egui_layer;
pub mod error;
pub mod factory;
pub mod frame;
pub mod handle;
pub mod instance;
pub mod memory;
pub mod offscreen;
pub mod pipeline;
pub mod renderer;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod ui;
pub mod vulkan;
pub mod window;

#[cfg(test)]
mod mock;

pub use backend::{AcquireOutcome, PresentOutcome, RenderBackend};
pub use capabilities::GpuCapabilities;
pub use context::{GpuContext, GpuContextBuilder, QueueFamilies};
pub use debug::{DiagnosticsSink, Severity, TracingDiagnostics};
pub use descriptors::{
    write_combined_image_sampler, write_uniform_buffer, DescriptorPool, DescriptorSetLayoutBuilder,
};
pub use drawable::{Drawable, DrawableRegistry, DrawableToken};
pub use egui_layer::EguiLayer;
pub use error::{GpuError, Result};
pub use factory::ResourceFactory;
pub use frame::{FrameScheduler, SlotState, MAX_FRAMES_IN_FLIGHT};
pub use handle::Owned;
pub use memory::{Buffer, Image};
pub use offscreen::OffscreenTarget;
pub use pipeline::{GraphicsPipeline, GraphicsPipelineDesc};
pub use renderer::{FrameOutcome, Renderer, RendererConfig};
pub use swapchain::SwapchainManager;
pub use sync::{create_fence, create_semaphore, FrameSync};
pub use texture::{Texture, TextureData};
pub use ui::{HeadlessUi, UiFrame, UiLayer};
pub use vulkan::VulkanBackend;
pub use window::WindowSurface;

pub use egui;

/// Renderer over the Vulkan backend.
pub type VulkanRenderer = Renderer<VulkanBackend>;
