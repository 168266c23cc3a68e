//! Drawable participants and their ordered registry.

use crate::error::Result;
use crate::ui::UiFrame;
use ash::vk;
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Handle returned by [`DrawableRegistry::register`].
    pub struct DrawableToken;
}

/// A participant in every rendered frame.
pub trait Drawable {
    /// Contribute immediate-mode UI. Must not record GPU commands.
    fn on_ui(&mut self, _ui: &mut UiFrame<'_>) {}

    /// Record draw commands into `cmd`, outside of any render pass.
    fn on_render(&mut self, cmd: vk::CommandBuffer) -> Result<()>;

    /// The presentation extent changed. May be `(0, 0)` while the window is
    /// minimized; size-dependent resources should wait for a nonzero extent.
    fn on_resize(&mut self, width: u32, height: u32);
}

/// Registered drawables, kept in registration order.
#[derive(Default)]
pub struct DrawableRegistry {
    drawables: SlotMap<DrawableToken, Box<dyn Drawable>>,
    order: Vec<DrawableToken>,
}

impl DrawableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `drawable` and tell it the current extent.
    pub fn register(&mut self, mut drawable: Box<dyn Drawable>, extent: vk::Extent2D) -> DrawableToken {
        drawable.on_resize(extent.width, extent.height);
        let token = self.drawables.insert(drawable);
        self.order.push(token);
        token
    }

    /// Remove a drawable, returning it if the token was still live.
    pub fn remove(&mut self, token: DrawableToken) -> Option<Box<dyn Drawable>> {
        let drawable = self.drawables.remove(token)?;
        self.order.retain(|&t| t != token);
        Some(drawable)
    }

    pub fn get_mut(&mut self, token: DrawableToken) -> Option<&mut (dyn Drawable + 'static)> {
        self.drawables.get_mut(token).map(|d| d.as_mut())
    }

    pub fn contains(&self, token: DrawableToken) -> bool {
        self.drawables.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Tokens in render order.
    pub fn tokens(&self) -> &[DrawableToken] {
        &self.order
    }

    /// Run the UI pass on every drawable.
    pub fn ui_all(&mut self, ui: &mut UiFrame<'_>) {
        for &token in &self.order {
            if let Some(drawable) = self.drawables.get_mut(token) {
                drawable.on_ui(ui);
            }
        }
    }

    /// Record every drawable into `cmd`, in registration order.
    pub fn render_all(&mut self, cmd: vk::CommandBuffer) -> Result<()> {
        for &token in &self.order {
            if let Some(drawable) = self.drawables.get_mut(token) {
                drawable.on_render(cmd)?;
            }
        }
        Ok(())
    }

    /// Forward a new extent to every drawable.
    pub fn resize_all(&mut self, width: u32, height: u32) {
        for &token in &self.order {
            if let Some(drawable) = self.drawables.get_mut(token) {
                drawable.on_resize(width, height);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{CallLog, RecordingDrawable};
    use crate::ui::HeadlessUi;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn register_forwards_current_extent() {
        let log = CallLog::default();
        let mut registry = DrawableRegistry::new();
        registry.register(Box::new(RecordingDrawable::new("a", &log)), extent(1200, 600));
        assert_eq!(log.take(), vec!["a.resize(1200,600)"]);
    }

    #[test]
    fn render_follows_registration_order() {
        let log = CallLog::default();
        let mut registry = DrawableRegistry::new();
        for name in ["grid", "quads", "preview"] {
            registry.register(Box::new(RecordingDrawable::new(name, &log)), extent(1, 1));
        }
        log.take();

        let mut ui = HeadlessUi::default();
        registry.ui_all(&mut UiFrame::new(&mut ui));
        registry.render_all(vk::CommandBuffer::null()).unwrap();
        assert_eq!(
            log.take(),
            vec![
                "grid.ui",
                "quads.ui",
                "preview.ui",
                "grid.render",
                "quads.render",
                "preview.render",
            ]
        );
    }

    #[test]
    fn removed_drawables_are_skipped_and_tokens_go_stale() {
        let log = CallLog::default();
        let mut registry = DrawableRegistry::new();
        let a = registry.register(Box::new(RecordingDrawable::new("a", &log)), extent(1, 1));
        let b = registry.register(Box::new(RecordingDrawable::new("b", &log)), extent(1, 1));
        log.take();

        assert!(registry.remove(a).is_some());
        assert!(registry.remove(a).is_none());
        assert!(!registry.contains(a));
        assert_eq!(registry.tokens(), &[b]);

        registry.resize_all(0, 0);
        assert_eq!(log.take(), vec!["b.resize(0,0)"]);

        let c = registry.register(Box::new(RecordingDrawable::new("c", &log)), extent(2, 2));
        assert_ne!(a, c);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn render_errors_stop_the_pass() {
        let log = CallLog::default();
        let mut registry = DrawableRegistry::new();
        registry.register(
            Box::new(RecordingDrawable::new("bad", &log).failing()),
            extent(1, 1),
        );
        registry.register(Box::new(RecordingDrawable::new("next", &log)), extent(1, 1));
        log.take();

        assert!(registry.render_all(vk::CommandBuffer::null()).is_err());
        assert_eq!(log.take(), vec!["bad.render"]);
    }
}
