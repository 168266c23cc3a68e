//! Platform abstraction for uengine.
//!
//! Owns the winit event loop and the single application window, and drives
//! the loop by pumping so the frame loop stays in control of the thread.
//! Window events are also translated into egui input.

use std::sync::Arc;
use std::time::Duration;

use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use thiserror::Error;
use uengine_gpu::WindowSurface;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowAttributes, WindowId};

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Window creation failed: {0}")]
    WindowCreation(String),
    #[error("Event loop error: {0}")]
    EventLoop(String),
}

pub type Result<T> = std::result::Result<T, PlatformError>;

/// Platform configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            title: "uengine".to_string(),
            width: 1200,
            height: 600,
            resizable: true,
        }
    }
}

impl PlatformConfig {
    /// Attributes for the application window.
    pub fn window_attributes(&self) -> WindowAttributes {
        Window::default_attributes()
            .with_title(&self.title)
            .with_inner_size(PhysicalSize::new(self.width, self.height))
            .with_resizable(self.resizable)
    }
}

/// Window facts the frame loop cares about, updated from window events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowState {
    size: (u32, u32),
    resized: bool,
    close_requested: bool,
}

impl WindowState {
    pub const fn new(size: (u32, u32)) -> Self {
        Self {
            size,
            resized: false,
            close_requested: false,
        }
    }

    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::Resized(size) => {
                self.size = (size.width, size.height);
                self.resized = true;
            }
            WindowEvent::CloseRequested => self.close_requested = true,
            _ => {}
        }
    }

    pub const fn size(&self) -> (u32, u32) {
        self.size
    }

    pub const fn is_minimized(&self) -> bool {
        self.size.0 == 0 || self.size.1 == 0
    }

    pub fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    pub const fn close_requested(&self) -> bool {
        self.close_requested
    }

    pub fn request_close(&mut self) {
        self.close_requested = true;
    }
}

struct Handler {
    config: PlatformConfig,
    egui_ctx: egui::Context,
    ui: Option<egui_winit::State>,
    window: Option<Arc<Window>>,
    state: WindowState,
    events: Vec<WindowEvent>,
    error: Option<PlatformError>,
}

impl ApplicationHandler for Handler {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match event_loop.create_window(self.config.window_attributes()) {
            Ok(window) => {
                let size = window.inner_size();
                self.state = WindowState::new((size.width, size.height));
                tracing::info!("Window created: {}x{}", size.width, size.height);
                self.ui = Some(egui_winit::State::new(
                    self.egui_ctx.clone(),
                    egui::ViewportId::ROOT,
                    &window,
                    Some(window.scale_factor() as f32),
                    window.theme(),
                    None,
                ));
                self.window = Some(Arc::new(window));
            }
            Err(e) => {
                self.error = Some(PlatformError::WindowCreation(e.to_string()));
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if matches!(event, WindowEvent::CloseRequested) {
            tracing::info!("Close requested");
        }
        if let (Some(ui), Some(window)) = (self.ui.as_mut(), self.window.as_deref()) {
            // The frame loop redraws continuously, so repaint hints are unused.
            let _ = ui.on_window_event(window, &event);
        }
        self.state.handle_event(&event);
        self.events.push(event);
    }
}

/// Event loop plus the application window.
pub struct Platform {
    event_loop: EventLoop<()>,
    handler: Handler,
    window: Arc<Window>,
    exited: bool,
}

impl Platform {
    /// Create the event loop and pump it until the window exists.
    pub fn new(config: PlatformConfig) -> Result<Self> {
        let mut event_loop =
            EventLoop::new().map_err(|e| PlatformError::EventLoop(e.to_string()))?;
        let mut handler = Handler {
            config,
            egui_ctx: egui::Context::default(),
            ui: None,
            window: None,
            state: WindowState::default(),
            events: Vec::new(),
            error: None,
        };

        let window = loop {
            let status = event_loop.pump_app_events(Some(Duration::ZERO), &mut handler);
            if let Some(error) = handler.error.take() {
                return Err(error);
            }
            if let Some(window) = &handler.window {
                break window.clone();
            }
            if let PumpStatus::Exit(code) = status {
                return Err(PlatformError::EventLoop(format!(
                    "event loop exited with code {code} before the window was created"
                )));
            }
        };

        Ok(Self {
            event_loop,
            handler,
            window,
            exited: false,
        })
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        if self.exited {
            return;
        }
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(timeout, &mut self.handler)
        {
            tracing::debug!(code, "Event loop exited");
            self.exited = true;
        }
    }

    /// Process pending events without blocking. Returns `false` once the
    /// application should shut down.
    pub fn poll_events(&mut self) -> bool {
        self.pump(Some(Duration::ZERO));
        !self.should_close()
    }

    pub fn should_close(&self) -> bool {
        self.exited || self.handler.state.close_requested()
    }

    pub fn request_close(&mut self) {
        self.handler.state.request_close();
    }

    /// Events received since the last call, in arrival order.
    pub fn drain_events(&mut self) -> Vec<WindowEvent> {
        std::mem::take(&mut self.handler.events)
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn state(&self) -> &WindowState {
        &self.handler.state
    }

    /// Context that receives this window's input.
    pub fn egui_context(&self) -> &egui::Context {
        &self.handler.egui_ctx
    }

    /// Largest texture the UI may allocate, from the device limits.
    pub fn set_max_texture_side(&mut self, side: usize) {
        if let Some(ui) = self.handler.ui.as_mut() {
            ui.set_max_texture_side(side);
        }
    }
}

impl WindowSurface for Platform {
    fn framebuffer_size(&self) -> (u32, u32) {
        self.handler.state.size()
    }

    fn take_resize_flag(&mut self) -> bool {
        self.handler.state.take_resized()
    }

    fn wait_events(&mut self) {
        self.pump(None);
    }

    fn should_close(&self) -> bool {
        Platform::should_close(self)
    }

    fn take_ui_input(&mut self) -> egui::RawInput {
        match self.handler.ui.as_mut() {
            Some(ui) => ui.take_egui_input(&self.window),
            None => egui::RawInput::default(),
        }
    }

    fn handle_ui_output(&mut self, output: egui::PlatformOutput) {
        if let Some(ui) = self.handler.ui.as_mut() {
            ui.handle_platform_output(&self.window, output);
        }
    }
}

impl HasDisplayHandle for Platform {
    fn display_handle(&self) -> std::result::Result<DisplayHandle<'_>, HandleError> {
        self.window.display_handle()
    }
}

impl HasWindowHandle for Platform {
    fn window_handle(&self) -> std::result::Result<WindowHandle<'_>, HandleError> {
        self.window.window_handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_1200_by_600() {
        let config = PlatformConfig::default();
        assert_eq!((config.width, config.height), (1200, 600));
        assert!(config.resizable);
    }

    #[test]
    fn window_attributes_follow_config() {
        let config = PlatformConfig {
            title: "Editor".into(),
            resizable: false,
            ..PlatformConfig::default()
        };
        let attrs = config.window_attributes();
        assert_eq!(attrs.title, "Editor");
        assert!(!attrs.resizable);
    }

    #[test]
    fn resize_events_update_size_and_raise_flag() {
        let mut state = WindowState::new((1200, 600));
        assert!(!state.take_resized());

        state.handle_event(&WindowEvent::Resized(PhysicalSize::new(800, 400)));
        assert_eq!(state.size(), (800, 400));
        assert!(state.take_resized());
        assert!(!state.take_resized());
    }

    #[test]
    fn zero_size_is_minimized() {
        let mut state = WindowState::new((1200, 600));
        state.handle_event(&WindowEvent::Resized(PhysicalSize::new(0, 0)));
        assert!(state.is_minimized());
        state.handle_event(&WindowEvent::Resized(PhysicalSize::new(1024, 768)));
        assert!(!state.is_minimized());
    }

    #[test]
    fn close_request_is_sticky() {
        let mut state = WindowState::new((1, 1));
        state.handle_event(&WindowEvent::Focused(true));
        assert!(!state.close_requested());
        state.handle_event(&WindowEvent::CloseRequested);
        assert!(state.close_requested());
        state.handle_event(&WindowEvent::Focused(false));
        assert!(state.close_requested());
    }
}
