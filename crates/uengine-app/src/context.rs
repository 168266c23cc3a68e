//! Application context.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use uengine_gpu::{
    EguiLayer, GpuContext, GpuContextBuilder, RenderBackend, Renderer, ResourceFactory,
    VulkanBackend, VulkanRenderer, WindowSurface,
};
use uengine_platform::Platform;

use crate::config::AppConfig;

/// Everything an application needs to render.
///
/// Field order is drop order: the renderer and factory release their GPU
/// objects before the window that backs the surface goes away.
pub struct AppContext {
    /// Frame loop, UI layer and drawable registry.
    pub renderer: VulkanRenderer,
    /// Resource creation for drawables.
    pub factory: ResourceFactory,
    /// Shared device context.
    pub gpu: Arc<GpuContext>,
    /// Window and event loop.
    pub platform: Platform,
    /// Frames drawn so far, including skipped ones.
    pub frame_count: u64,
    /// Time at which the loop started.
    pub start_time: Instant,
}

impl AppContext {
    /// Open the window and bring up the device, swapchain and renderer.
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let mut platform =
            Platform::new(config.platform_config()).context("Failed to create window")?;

        let gpu = GpuContextBuilder::new()
            .app_name(&config.title)
            .validation(config.validation)
            .build(&platform)
            .context("Failed to initialize GPU")?;
        let gpu = Arc::new(gpu);

        // A swapchain cannot be created for a minimized window.
        while platform.state().is_minimized() && !platform.should_close() {
            platform.wait_events();
        }

        let backend = VulkanBackend::new(gpu.clone(), platform.framebuffer_size())
            .context("Failed to create swapchain")?;
        platform.set_max_texture_side(gpu.capabilities().max_image_dimension_2d as usize);
        let ui = EguiLayer::new(
            gpu.clone(),
            platform.egui_context().clone(),
            backend.present_render_pass()?,
            backend.swapchain().format().format,
        )
        .context("Failed to initialize UI")?;
        let renderer = Renderer::new(backend, config.renderer_config()).with_ui(Box::new(ui));
        let factory = ResourceFactory::new(gpu.clone())?;

        Ok(Self {
            renderer,
            factory,
            gpu,
            platform,
            frame_count: 0,
            start_time: Instant::now(),
        })
    }

    /// Seconds since the loop started.
    pub fn elapsed(&self) -> f32 {
        self.start_time.elapsed().as_secs_f32()
    }

    /// Ask the loop to stop after the current frame.
    pub fn request_exit(&mut self) {
        self.platform.request_close();
    }
}
