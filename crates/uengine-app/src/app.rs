//! `UengineApp` trait definition.

use crate::context::AppContext;
use winit::event::WindowEvent;

/// Trait for uengine applications.
///
/// The framework creates the window, the GPU context and the renderer, then
/// calls `update` once per frame before drawing. Rendering work is done by
/// drawables registered on [`AppContext::renderer`].
pub trait UengineApp: Sized {
    /// Initialize the application.
    ///
    /// Called once after the window, GPU context and renderer exist.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state. `dt` is the time since the last frame in
    /// seconds.
    #[allow(unused_variables)]
    fn update(&mut self, ctx: &mut AppContext, dt: f32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle a window event. Return `true` to stop further processing.
    #[allow(unused_variables)]
    fn on_event(&mut self, ctx: &mut AppContext, event: &WindowEvent) -> bool {
        false
    }

    /// Cleanup before shutdown. The GPU is idle when this is called.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
