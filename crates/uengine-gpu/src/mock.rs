//! Test doubles for the frame loop.

use crate::backend::{AcquireOutcome, PresentOutcome, RenderBackend};
use crate::drawable::Drawable;
use crate::error::{GpuError, Result};
use crate::ui::{HeadlessUi, UiFrame, UiLayer};
use crate::window::WindowSurface;
use ash::vk::{self, Handle};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Shared, ordered record of calls made by the doubles.
#[derive(Debug, Default, Clone)]
pub struct CallLog(Rc<RefCell<Vec<String>>>);

impl CallLog {
    pub fn push(&self, call: impl Into<String>) {
        self.0.borrow_mut().push(call.into());
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

pub struct RecordingDrawable {
    name: String,
    log: CallLog,
    fail: bool,
}

impl RecordingDrawable {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            fail: false,
        }
    }

    /// Make `on_render` return an error after logging.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl Drawable for RecordingDrawable {
    fn on_ui(&mut self, _ui: &mut UiFrame<'_>) {
        self.log.push(format!("{}.ui", self.name));
    }

    fn on_render(&mut self, _cmd: vk::CommandBuffer) -> Result<()> {
        self.log.push(format!("{}.render", self.name));
        if self.fail {
            return Err(GpuError::InvalidState(format!("{} failed", self.name)));
        }
        Ok(())
    }

    fn on_resize(&mut self, width: u32, height: u32) {
        self.log.push(format!("{}.resize({width},{height})", self.name));
    }
}

/// Backend that logs every call and hands out images round-robin.
pub struct MockBackend {
    log: CallLog,
    image_count: usize,
    extent: vk::Extent2D,
    next_image: u32,
    acquire_script: VecDeque<AcquireOutcome>,
    present_script: VecDeque<PresentOutcome>,
    fail_submit: bool,
    last_clear_color: Option<[f32; 4]>,
    images: usize,
    views: usize,
    framebuffers: usize,
}

impl MockBackend {
    pub fn new(log: &CallLog, image_count: usize, size: (u32, u32)) -> Self {
        Self {
            log: log.clone(),
            image_count,
            extent: vk::Extent2D {
                width: size.0,
                height: size.1,
            },
            next_image: 0,
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            fail_submit: false,
            last_clear_color: None,
            images: image_count,
            views: image_count,
            framebuffers: image_count,
        }
    }

    /// Live swapchain images, image views and framebuffers.
    pub fn per_image_counts(&self) -> (usize, usize, usize) {
        (self.images, self.views, self.framebuffers)
    }

    /// Override the outcome of the next acquire.
    pub fn push_acquire(&mut self, outcome: AcquireOutcome) {
        self.acquire_script.push_back(outcome);
    }

    /// Override the outcome of the next present.
    pub fn push_present(&mut self, outcome: PresentOutcome) {
        self.present_script.push_back(outcome);
    }

    pub fn fail_next_submit(&mut self) {
        self.fail_submit = true;
    }

    pub fn set_image_count(&mut self, count: usize) {
        self.image_count = count;
    }

    pub fn last_clear_color(&self) -> Option<[f32; 4]> {
        self.last_clear_color
    }
}

impl RenderBackend for MockBackend {
    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn present_render_pass(&self) -> Result<vk::RenderPass> {
        Ok(vk::RenderPass::null())
    }

    fn image_count(&self) -> usize {
        self.images
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        self.log.push(format!("wait_for_slot({slot})"));
        Ok(())
    }

    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
        self.log.push(format!("acquire({slot})"));
        if let Some(outcome) = self.acquire_script.pop_front() {
            return Ok(outcome);
        }
        let image_index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count as u32;
        Ok(AcquireOutcome::Ready {
            image_index,
            suboptimal: false,
        })
    }

    fn begin_commands(&mut self, slot: usize) -> Result<vk::CommandBuffer> {
        self.log.push(format!("begin_commands({slot})"));
        Ok(vk::CommandBuffer::from_raw(slot as u64 + 1))
    }

    fn begin_present_pass(
        &mut self,
        slot: usize,
        image_index: u32,
        clear_color: [f32; 4],
    ) -> Result<()> {
        self.log
            .push(format!("begin_present_pass({slot},{image_index})"));
        self.last_clear_color = Some(clear_color);
        Ok(())
    }

    fn end_present_pass(&mut self, slot: usize) -> Result<()> {
        self.log.push(format!("end_present_pass({slot})"));
        Ok(())
    }

    fn end_commands(&mut self, slot: usize) -> Result<()> {
        self.log.push(format!("end_commands({slot})"));
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        self.log.push(format!("submit({slot})"));
        if std::mem::take(&mut self.fail_submit) {
            return Err(GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST));
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
        self.log.push(format!("present({slot},{image_index})"));
        Ok(self
            .present_script
            .pop_front()
            .unwrap_or(PresentOutcome::Optimal))
    }

    fn wait_present_idle(&mut self) -> Result<()> {
        self.log.push("wait_present_idle");
        Ok(())
    }

    fn wait_device_idle(&mut self) -> Result<()> {
        self.log.push("wait_device_idle");
        Ok(())
    }

    fn free_command_buffers(&mut self) {
        self.log.push("free_command_buffers");
    }

    fn destroy_framebuffers(&mut self) {
        self.log.push("destroy_framebuffers");
        self.framebuffers = 0;
    }

    fn destroy_image_views(&mut self) {
        self.log.push("destroy_image_views");
        self.views = 0;
    }

    fn destroy_render_pass(&mut self) {
        self.log.push("destroy_render_pass");
    }

    fn destroy_swapchain(&mut self) {
        self.log.push("destroy_swapchain");
        self.images = 0;
    }

    fn create_render_pass(&mut self) -> Result<()> {
        self.log.push("create_render_pass");
        Ok(())
    }

    fn create_swapchain(&mut self, framebuffer_size: (u32, u32)) -> Result<()> {
        let (width, height) = framebuffer_size;
        self.log.push(format!("create_swapchain({width}x{height})"));
        self.extent = vk::Extent2D { width, height };
        self.images = self.image_count;
        self.next_image = 0;
        Ok(())
    }

    fn create_image_views(&mut self) -> Result<()> {
        self.log.push("create_image_views");
        self.views = self.images;
        Ok(())
    }

    fn create_framebuffers(&mut self) -> Result<()> {
        self.log.push("create_framebuffers");
        self.framebuffers = self.views;
        Ok(())
    }

    fn allocate_command_buffers(&mut self) -> Result<()> {
        self.log.push("allocate_command_buffers");
        Ok(())
    }
}

/// Window whose size changes are scripted by the test.
pub struct MockWindow {
    log: CallLog,
    size: (u32, u32),
    resized: bool,
    sizes_after_wait: VecDeque<(u32, u32)>,
    close_on_wait: bool,
    closed: bool,
    ui_outputs: usize,
}

impl MockWindow {
    pub fn new(log: &CallLog, size: (u32, u32)) -> Self {
        Self {
            log: log.clone(),
            size,
            resized: false,
            sizes_after_wait: VecDeque::new(),
            close_on_wait: false,
            closed: false,
            ui_outputs: 0,
        }
    }

    /// Report the window as closing once the next `wait_events` returns.
    pub fn close_on_wait(&mut self) {
        self.close_on_wait = true;
    }

    /// Number of UI frames whose output reached the window.
    pub fn ui_outputs(&self) -> usize {
        self.ui_outputs
    }

    /// Change the size and raise the resize flag.
    pub fn resize(&mut self, size: (u32, u32)) {
        self.size = size;
        self.resized = true;
    }

    /// Size reported after the next `wait_events`.
    pub fn queue_size_after_wait(&mut self, size: (u32, u32)) {
        self.sizes_after_wait.push_back(size);
    }
}

impl WindowSurface for MockWindow {
    fn framebuffer_size(&self) -> (u32, u32) {
        self.size
    }

    fn take_resize_flag(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    fn wait_events(&mut self) {
        self.log.push("wait_events");
        if std::mem::take(&mut self.close_on_wait) {
            self.closed = true;
            return;
        }
        let size = self
            .sizes_after_wait
            .pop_front()
            .expect("wait_events called with no queued size");
        self.resize(size);
    }

    fn should_close(&self) -> bool {
        self.closed
    }

    fn take_ui_input(&mut self) -> egui::RawInput {
        egui::RawInput::default()
    }

    fn handle_ui_output(&mut self, _output: egui::PlatformOutput) {
        self.ui_outputs += 1;
    }
}

/// Headless UI that logs the calls the renderer makes.
pub struct RecordingUi {
    inner: HeadlessUi,
    log: CallLog,
}

impl RecordingUi {
    pub fn new(log: &CallLog) -> Self {
        Self {
            inner: HeadlessUi::default(),
            log: log.clone(),
        }
    }
}

impl UiLayer for RecordingUi {
    fn context(&self) -> &egui::Context {
        self.inner.context()
    }

    fn begin_frame(&mut self, slot: usize, input: egui::RawInput) -> Result<()> {
        self.log.push(format!("ui.begin({slot})"));
        self.inner.begin_frame(slot, input)
    }

    fn end_frame(&mut self, slot: usize) -> Result<egui::PlatformOutput> {
        self.log.push(format!("ui.end({slot})"));
        self.inner.end_frame(slot)
    }

    fn record(&mut self, cmd: vk::CommandBuffer, extent: vk::Extent2D) -> Result<()> {
        self.log
            .push(format!("ui.record({}x{})", extent.width, extent.height));
        self.inner.record(cmd, extent)
    }

    fn set_render_pass(&mut self, render_pass: vk::RenderPass) -> Result<()> {
        self.log.push("ui.set_render_pass");
        self.inner.set_render_pass(render_pass)
    }

    fn register_texture(
        &mut self,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> Result<egui::TextureId> {
        self.inner.register_texture(view, sampler)
    }

    fn update_texture(
        &mut self,
        id: egui::TextureId,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> Result<()> {
        self.inner.update_texture(id, view, sampler)
    }
}
