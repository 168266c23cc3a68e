//! The frame loop: acquire, record, submit, present, rebuild.

use crate::backend::{AcquireOutcome, PresentOutcome, RenderBackend};
use crate::drawable::{Drawable, DrawableRegistry, DrawableToken};
use crate::error::Result;
use crate::frame::{FrameScheduler, SlotState};
use crate::ui::{HeadlessUi, UiFrame, UiLayer};
use crate::window::WindowSurface;
use ash::vk;

/// Renderer settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererConfig {
    /// Clear color of the swapchain pass.
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            clear_color: [1.0, 0.0, 0.0, 0.0],
        }
    }
}

/// What happened to one call of [`Renderer::draw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and presented. `rebuilt` is set when the
    /// swapchain was rebuilt after presenting.
    Presented { image_index: u32, rebuilt: bool },
    /// The swapchain was out of date; it was rebuilt and nothing was drawn.
    Skipped,
}

/// Drives a [`RenderBackend`] through the frame protocol.
pub struct Renderer<B: RenderBackend> {
    backend: B,
    scheduler: FrameScheduler,
    drawables: DrawableRegistry,
    ui: Box<dyn UiLayer>,
    config: RendererConfig,
    frames_presented: u64,
    rebuilds: u64,
}

impl<B: RenderBackend> Renderer<B> {
    /// Wrap a backend whose swapchain is already built.
    pub fn new(backend: B, config: RendererConfig) -> Self {
        let scheduler = FrameScheduler::new(backend.image_count());
        Self {
            backend,
            scheduler,
            drawables: DrawableRegistry::new(),
            ui: Box::new(HeadlessUi::default()),
            config,
            frames_presented: 0,
            rebuilds: 0,
        }
    }

    /// Replace the UI layer. Without one, UI frames run headless.
    #[must_use]
    pub fn with_ui(mut self, ui: Box<dyn UiLayer>) -> Self {
        self.ui = ui;
        self
    }

    /// Register a drawable; it immediately receives the current extent.
    pub fn register(&mut self, drawable: Box<dyn Drawable>) -> DrawableToken {
        self.drawables.register(drawable, self.backend.extent())
    }

    /// Remove a drawable.
    pub fn remove(&mut self, token: DrawableToken) -> Option<Box<dyn Drawable>> {
        self.drawables.remove(token)
    }

    pub fn ui(&self) -> &dyn UiLayer {
        self.ui.as_ref()
    }

    pub fn ui_mut(&mut self) -> &mut dyn UiLayer {
        self.ui.as_mut()
    }

    pub fn drawables(&self) -> &DrawableRegistry {
        &self.drawables
    }

    pub fn drawables_mut(&mut self) -> &mut DrawableRegistry {
        &mut self.drawables
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.config.clear_color = color;
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.backend.extent()
    }

    pub const fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub const fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// Render one frame.
    pub fn draw(&mut self, window: &mut dyn WindowSurface) -> Result<FrameOutcome> {
        let slot = self.scheduler.current_slot();

        self.backend.wait_for_slot(slot)?;
        self.scheduler.begin_acquire();

        let image_index = match self.backend.acquire_next_image(slot)? {
            AcquireOutcome::OutOfDate => {
                tracing::debug!(slot, "Swapchain out of date on acquire");
                self.scheduler.abort_acquire();
                self.rebuild_swapchain(window)?;
                return Ok(FrameOutcome::Skipped);
            }
            AcquireOutcome::Ready {
                image_index,
                suboptimal,
            } => {
                tracing::trace!(slot, image_index, suboptimal, "Acquired image");
                image_index
            }
        };

        if let Some(owner) = self.scheduler.claim_image(image_index)? {
            self.backend.wait_for_slot(owner)?;
        }
        debug_assert!(self.scheduler.recording_slots() <= 1);

        self.record(slot, image_index, window)?;

        self.backend.submit(slot)?;
        self.scheduler.mark_submitted();

        let presented = self.backend.present(slot, image_index)?;
        let resized = window.take_resize_flag();
        let rebuilt = presented.needs_rebuild() || resized;
        if presented == PresentOutcome::Suboptimal {
            tracing::warn!(image_index, "Presented to a suboptimal swapchain");
        }
        if rebuilt {
            tracing::debug!(?presented, resized, "Rebuilding after present");
            self.rebuild_swapchain(window)?;
        }

        self.backend.wait_present_idle()?;
        self.scheduler.advance();
        self.frames_presented += 1;

        Ok(FrameOutcome::Presented {
            image_index,
            rebuilt,
        })
    }

    /// UI pass, then the slot's command buffer: drawables, swapchain pass
    /// with UI draw data.
    fn record(
        &mut self,
        slot: usize,
        image_index: u32,
        window: &mut dyn WindowSurface,
    ) -> Result<()> {
        debug_assert_eq!(self.scheduler.state(slot), SlotState::Recording);

        self.ui.begin_frame(slot, window.take_ui_input())?;
        self.drawables.ui_all(&mut UiFrame::new(self.ui.as_mut()));
        let output = self.ui.end_frame(slot)?;
        window.handle_ui_output(output);

        let cmd = self.backend.begin_commands(slot)?;
        self.drawables.render_all(cmd)?;
        self.backend
            .begin_present_pass(slot, image_index, self.config.clear_color)?;
        self.ui.record(cmd, self.backend.extent())?;
        self.backend.end_present_pass(slot)?;
        self.backend.end_commands(slot)
    }

    /// Rebuild everything that depends on the surface size.
    ///
    /// Blocks on window events while the framebuffer is zero-sized; drawables
    /// see `(0, 0)` once before the wait. Returns without rebuilding if the
    /// window closes during the wait.
    pub fn rebuild_swapchain(&mut self, window: &mut dyn WindowSurface) -> Result<()> {
        let mut size = window.framebuffer_size();
        if size.0 == 0 || size.1 == 0 {
            tracing::debug!("Framebuffer is zero-sized, waiting for events");
            self.drawables.resize_all(0, 0);
            while size.0 == 0 || size.1 == 0 {
                if window.should_close() {
                    tracing::debug!("Window closed while minimized, rebuild abandoned");
                    return Ok(());
                }
                window.wait_events();
                size = window.framebuffer_size();
            }
        }

        self.backend.wait_device_idle()?;

        self.backend.free_command_buffers();
        self.backend.destroy_framebuffers();
        self.backend.destroy_image_views();
        self.backend.destroy_render_pass();
        self.backend.destroy_swapchain();

        self.backend.create_render_pass()?;
        self.backend.create_swapchain(size)?;
        self.backend.create_image_views()?;
        self.backend.create_framebuffers()?;
        self.backend.allocate_command_buffers()?;
        self.ui.set_render_pass(self.backend.present_render_pass()?)?;

        self.scheduler.reset_images(self.backend.image_count());
        // Any flag raised during the stall is covered by this rebuild.
        window.take_resize_flag();

        let extent = self.backend.extent();
        self.drawables.resize_all(extent.width, extent.height);
        self.rebuilds += 1;

        tracing::info!(
            "Swapchain rebuilt: {}x{}, {} images",
            extent.width,
            extent.height,
            self.backend.image_count()
        );
        Ok(())
    }

    /// Wait for all GPU work; call before dropping resources the GPU may use.
    pub fn wait_idle(&mut self) -> Result<()> {
        self.backend.wait_device_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{CallLog, MockBackend, MockWindow, RecordingDrawable, RecordingUi};

    const FRAME: [&str; 9] = [
        "wait_for_slot",
        "acquire",
        "begin_commands",
        "begin_present_pass",
        "end_present_pass",
        "end_commands",
        "submit",
        "present",
        "wait_present_idle",
    ];

    const REBUILD: [&str; 11] = [
        "wait_device_idle",
        "free_command_buffers",
        "destroy_framebuffers",
        "destroy_image_views",
        "destroy_render_pass",
        "destroy_swapchain",
        "create_render_pass",
        "create_swapchain",
        "create_image_views",
        "create_framebuffers",
        "allocate_command_buffers",
    ];

    fn names(calls: &[String]) -> Vec<&str> {
        calls
            .iter()
            .map(|c| c.split('(').next().unwrap_or(c))
            .collect()
    }

    fn setup(log: &CallLog) -> (Renderer<MockBackend>, MockWindow) {
        let backend = MockBackend::new(log, 3, (1200, 600));
        let renderer = Renderer::new(backend, RendererConfig::default());
        (renderer, MockWindow::new(log, (1200, 600)))
    }

    #[test]
    fn first_two_frames_cycle_slots() {
        let log = CallLog::default();
        let (mut renderer, mut window) = setup(&log);

        let outcome = renderer.draw(&mut window).unwrap();
        assert_eq!(
            outcome,
            FrameOutcome::Presented {
                image_index: 0,
                rebuilt: false
            }
        );
        let calls = log.take();
        assert_eq!(names(&calls), FRAME);
        assert_eq!(calls[0], "wait_for_slot(0)");
        assert_eq!(calls[1], "acquire(0)");
        assert_eq!(calls[6], "submit(0)");
        assert_eq!(calls[7], "present(0,0)");
        assert_eq!(renderer.scheduler().current_slot(), 1);

        renderer.draw(&mut window).unwrap();
        let calls = log.take();
        assert_eq!(calls[0], "wait_for_slot(1)");
        assert_eq!(calls[6], "submit(1)");
        assert_eq!(calls[7], "present(1,1)");
        assert_eq!(renderer.scheduler().current_slot(), 0);
        assert_eq!(renderer.frames_presented(), 2);
    }

    #[test]
    fn drawables_record_before_the_swapchain_pass() {
        let log = CallLog::default();
        let (mut renderer, mut window) = setup(&log);
        renderer.register(Box::new(RecordingDrawable::new("grid", &log)));
        renderer.register(Box::new(RecordingDrawable::new("preview", &log)));
        assert_eq!(
            log.take(),
            vec!["grid.resize(1200,600)", "preview.resize(1200,600)"]
        );

        renderer.draw(&mut window).unwrap();
        assert_eq!(
            names(&log.take()),
            vec![
                "wait_for_slot",
                "acquire",
                "grid.ui",
                "preview.ui",
                "begin_commands",
                "grid.render",
                "preview.render",
                "begin_present_pass",
                "end_present_pass",
                "end_commands",
                "submit",
                "present",
                "wait_present_idle",
            ]
        );
    }

    #[test]
    fn stale_acquire_rebuilds_and_skips_the_frame() {
        let log = CallLog::default();
        let (mut renderer, mut window) = setup(&log);
        renderer.register(Box::new(RecordingDrawable::new("d", &log)));

        for _ in 0..4 {
            renderer.draw(&mut window).unwrap();
        }
        log.take();

        renderer
            .backend_mut()
            .push_acquire(AcquireOutcome::OutOfDate);
        let outcome = renderer.draw(&mut window).unwrap();
        assert_eq!(outcome, FrameOutcome::Skipped);

        let calls = log.take();
        let mut expected = vec!["wait_for_slot", "acquire"];
        expected.extend(REBUILD);
        expected.push("d.resize");
        assert_eq!(names(&calls), expected);
        assert!(!calls.iter().any(|c| c.starts_with("submit") || c.starts_with("present")));
        assert_eq!(renderer.rebuilds(), 1);
        assert_eq!(renderer.scheduler().state(0), SlotState::Idle);
        // Slot is not advanced by a skipped frame.
        assert_eq!(renderer.scheduler().current_slot(), 0);
    }

    #[test]
    fn suboptimal_present_rebuilds_after_presenting() {
        let log = CallLog::default();
        let (mut renderer, mut window) = setup(&log);
        renderer
            .backend_mut()
            .push_present(PresentOutcome::Suboptimal);

        let outcome = renderer.draw(&mut window).unwrap();
        assert_eq!(
            outcome,
            FrameOutcome::Presented {
                image_index: 0,
                rebuilt: true
            }
        );
        let calls = log.take();
        let mut expected: Vec<&str> = FRAME[..8].to_vec();
        expected.extend(REBUILD);
        expected.push("wait_present_idle");
        assert_eq!(names(&calls), expected);
        assert_eq!(renderer.scheduler().current_slot(), 1);
    }

    #[test]
    fn out_of_date_present_rebuilds_and_still_advances() {
        let log = CallLog::default();
        let (mut renderer, mut window) = setup(&log);
        renderer.register(Box::new(RecordingDrawable::new("d", &log)));
        log.take();
        renderer
            .backend_mut()
            .push_present(PresentOutcome::OutOfDate);

        let outcome = renderer.draw(&mut window).unwrap();
        assert_eq!(
            outcome,
            FrameOutcome::Presented {
                image_index: 0,
                rebuilt: true
            }
        );
        let calls = log.take();
        let mut expected = vec!["wait_for_slot", "acquire", "d.ui", "begin_commands", "d.render"];
        expected.extend(&FRAME[3..8]);
        expected.extend(REBUILD);
        expected.push("d.resize");
        expected.push("wait_present_idle");
        assert_eq!(names(&calls), expected);
        assert_eq!(renderer.rebuilds(), 1);
        assert_eq!(renderer.scheduler().current_slot(), 1);
        assert_eq!(renderer.frames_presented(), 1);
    }

    #[test]
    fn resize_flag_triggers_rebuild_with_new_extent() {
        let log = CallLog::default();
        let (mut renderer, mut window) = setup(&log);
        renderer.register(Box::new(RecordingDrawable::new("d", &log)));
        log.take();

        window.resize((800, 400));
        renderer.draw(&mut window).unwrap();

        let calls = log.take();
        assert!(calls.contains(&"create_swapchain(800x400)".to_string()));
        assert!(calls.contains(&"d.resize(800,400)".to_string()));
        assert_eq!(renderer.extent().width, 800);
        assert_eq!(renderer.rebuilds(), 1);

        renderer.draw(&mut window).unwrap();
        assert_eq!(renderer.rebuilds(), 1);
    }

    #[test]
    fn minimize_then_restore_rebuilds_once() {
        let log = CallLog::default();
        let (mut renderer, mut window) = setup(&log);
        renderer.register(Box::new(RecordingDrawable::new("d", &log)));
        log.take();

        window.resize((0, 0));
        window.queue_size_after_wait((0, 0));
        window.queue_size_after_wait((1024, 768));
        renderer.draw(&mut window).unwrap();

        let calls = log.take();
        let zero_pos = calls.iter().position(|c| c == "d.resize(0,0)").unwrap();
        let idle_pos = calls.iter().position(|c| c == "wait_device_idle").unwrap();
        assert!(zero_pos < idle_pos);
        assert_eq!(calls.iter().filter(|c| *c == "wait_events").count(), 2);
        assert_eq!(
            calls.iter().filter(|c| c.starts_with("create_swapchain")).count(),
            1
        );
        assert!(calls.contains(&"create_swapchain(1024x768)".to_string()));
        assert_eq!(calls.last().map(String::as_str), Some("wait_present_idle"));
        assert_eq!(renderer.rebuilds(), 1);

        renderer.draw(&mut window).unwrap();
        assert_eq!(renderer.rebuilds(), 1);
    }

    #[test]
    fn closing_while_minimized_abandons_the_rebuild() {
        let log = CallLog::default();
        let (mut renderer, mut window) = setup(&log);
        renderer.register(Box::new(RecordingDrawable::new("d", &log)));
        log.take();

        window.resize((0, 0));
        window.close_on_wait();
        renderer.draw(&mut window).unwrap();

        let calls = log.take();
        assert_eq!(calls.iter().filter(|c| *c == "wait_events").count(), 1);
        assert!(calls.contains(&"d.resize(0,0)".to_string()));
        assert!(!calls.iter().any(|c| c.starts_with("create_swapchain")));
        assert_eq!(renderer.rebuilds(), 0);
    }

    #[test]
    fn image_reuse_waits_on_the_previous_slot() {
        let log = CallLog::default();
        let backend = MockBackend::new(&log, 1, (640, 480));
        let mut renderer = Renderer::new(backend, RendererConfig::default());
        let mut window = MockWindow::new(&log, (640, 480));

        renderer.draw(&mut window).unwrap();
        log.take();
        renderer.draw(&mut window).unwrap();
        let calls = log.take();
        assert_eq!(&calls[..3], ["wait_for_slot(1)", "acquire(1)", "wait_for_slot(0)"]);
    }

    #[test]
    fn rebuild_clears_image_ownership() {
        let log = CallLog::default();
        let (mut renderer, mut window) = setup(&log);
        assert_eq!(renderer.backend().per_image_counts(), (3, 3, 3));
        renderer.draw(&mut window).unwrap();
        assert_eq!(renderer.scheduler().images_in_flight()[0], Some(0));

        renderer.rebuild_swapchain(&mut window).unwrap();
        assert_eq!(renderer.backend().per_image_counts(), (3, 3, 3));

        renderer.backend_mut().set_image_count(4);
        renderer.rebuild_swapchain(&mut window).unwrap();
        assert_eq!(renderer.backend().per_image_counts(), (4, 4, 4));
        assert_eq!(renderer.scheduler().images_in_flight(), &[None; 4]);
    }

    #[test]
    fn ui_pass_brackets_drawables_and_draws_in_the_present_pass() {
        let log = CallLog::default();
        let (renderer, mut window) = setup(&log);
        let mut renderer = renderer.with_ui(Box::new(RecordingUi::new(&log)));
        renderer.register(Box::new(RecordingDrawable::new("d", &log)));
        log.take();

        renderer.draw(&mut window).unwrap();
        assert_eq!(
            log.take(),
            vec![
                "wait_for_slot(0)",
                "acquire(0)",
                "ui.begin(0)",
                "d.ui",
                "ui.end(0)",
                "begin_commands(0)",
                "d.render",
                "begin_present_pass(0,0)",
                "ui.record(1200x600)",
                "end_present_pass(0)",
                "end_commands(0)",
                "submit(0)",
                "present(0,0)",
                "wait_present_idle",
            ]
        );
        assert_eq!(window.ui_outputs(), 1);
    }

    #[test]
    fn rebuild_rebinds_the_ui_render_pass() {
        let log = CallLog::default();
        let (renderer, mut window) = setup(&log);
        let mut renderer = renderer.with_ui(Box::new(RecordingUi::new(&log)));

        window.resize((800, 400));
        renderer.draw(&mut window).unwrap();
        let calls = log.take();
        let allocated = calls
            .iter()
            .position(|c| c == "allocate_command_buffers")
            .unwrap();
        assert_eq!(calls[allocated + 1], "ui.set_render_pass");

        renderer.draw(&mut window).unwrap();
        assert!(log.take().contains(&"ui.record(800x400)".to_string()));
    }

    #[test]
    fn fatal_errors_propagate() {
        let log = CallLog::default();
        let (mut renderer, mut window) = setup(&log);
        renderer.backend_mut().fail_next_submit();
        assert!(renderer.draw(&mut window).is_err());
        assert!(!log.take().iter().any(|c| c.starts_with("present")));
    }

    #[test]
    fn clear_color_reaches_the_backend() {
        let log = CallLog::default();
        let (mut renderer, mut window) = setup(&log);
        renderer.set_clear_color([0.1, 0.2, 0.3, 1.0]);
        renderer.draw(&mut window).unwrap();
        assert_eq!(renderer.backend().last_clear_color(), Some([0.1, 0.2, 0.3, 1.0]));
    }
}
