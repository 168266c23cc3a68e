//! What the renderer needs from the window layer.

/// Window queries used by the frame loop and swapchain rebuilds.
pub trait WindowSurface {
    /// Current framebuffer size in pixels. `(0, 0)` while minimized.
    fn framebuffer_size(&self) -> (u32, u32);

    /// Return whether a resize was observed since the last call, and clear it.
    fn take_resize_flag(&mut self) -> bool;

    /// Block until at least one window event has been processed.
    fn wait_events(&mut self);

    /// The window is closing; blocking waits may no longer return events.
    fn should_close(&self) -> bool;

    /// Input gathered for the next UI frame.
    fn take_ui_input(&mut self) -> egui::RawInput;

    /// Apply cursor, clipboard and similar requests from a UI frame.
    fn handle_ui_output(&mut self, output: egui::PlatformOutput);
}
