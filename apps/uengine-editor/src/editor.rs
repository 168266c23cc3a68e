//! Editor application state.

use tracing::info;
use uengine_app::{AppContext, DrawableToken, UengineApp, WindowEvent};
use winit::keyboard::{Key, NamedKey};

use crate::drawables::{PreviewDrawable, StatusDrawable};

pub struct Editor {
    preview: DrawableToken,
    status: DrawableToken,
}

impl UengineApp for Editor {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let extent = ctx.renderer.extent();
        let preview = PreviewDrawable::new(&ctx.factory, extent.width, extent.height)?;

        let preview = ctx.renderer.register(Box::new(preview));
        let status = ctx.renderer.register(Box::new(StatusDrawable::default()));
        info!(
            drawables = ctx.renderer.drawables().len(),
            "Editor initialized"
        );

        Ok(Self { preview, status })
    }

    fn on_event(&mut self, ctx: &mut AppContext, event: &WindowEvent) -> bool {
        if let WindowEvent::KeyboardInput { event, .. } = event {
            if event.state.is_pressed() && event.logical_key == Key::Named(NamedKey::Escape) {
                ctx.request_exit();
                return true;
            }
        }
        false
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        ctx.renderer.remove(self.status);
        ctx.renderer.remove(self.preview);
        info!("Editor shut down after {} frames", ctx.frame_count);
    }
}
