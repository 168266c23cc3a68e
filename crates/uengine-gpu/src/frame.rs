//! Frame-slot bookkeeping.
//!
//! Tracks which slot is current, what state each slot is in, and which slot
//! last rendered into each swapchain image.

use crate::error::{GpuError, Result};

/// Number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Lifecycle of one frame slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Fence signaled; free for reuse.
    Idle,
    /// Waiting for a presentable image.
    Acquiring,
    /// Command buffer is being recorded.
    Recording,
    /// Submitted; the fence signals when the GPU is done.
    Submitted,
}

#[derive(Debug, Clone)]
pub struct FrameScheduler {
    current: usize,
    states: [SlotState; MAX_FRAMES_IN_FLIGHT],
    images_in_flight: Vec<Option<usize>>,
}

impl FrameScheduler {
    pub fn new(image_count: usize) -> Self {
        Self {
            current: 0,
            states: [SlotState::Idle; MAX_FRAMES_IN_FLIGHT],
            images_in_flight: vec![None; image_count],
        }
    }

    pub const fn current_slot(&self) -> usize {
        self.current
    }

    pub const fn state(&self, slot: usize) -> SlotState {
        self.states[slot]
    }

    /// Number of slots currently recording. Never more than one.
    pub fn recording_slots(&self) -> usize {
        self.states
            .iter()
            .filter(|&&s| s == SlotState::Recording)
            .count()
    }

    /// Slot that last rendered into each image.
    pub fn images_in_flight(&self) -> &[Option<usize>] {
        &self.images_in_flight
    }

    /// The current slot's fence has been waited; start acquiring.
    pub fn begin_acquire(&mut self) {
        self.states[self.current] = SlotState::Acquiring;
    }

    /// Acquisition failed recoverably; the slot is free again.
    pub fn abort_acquire(&mut self) {
        self.states[self.current] = SlotState::Idle;
    }

    /// Record that the current slot now owns `image_index` and move it to
    /// `Recording`. Returns the previous owner if it was a different slot,
    /// whose fence must be waited before rendering into the image.
    pub fn claim_image(&mut self, image_index: u32) -> Result<Option<usize>> {
        let entry = self
            .images_in_flight
            .get_mut(image_index as usize)
            .ok_or_else(|| {
                GpuError::InvalidState(format!("acquired image {image_index} is out of range"))
            })?;
        let previous = entry.replace(self.current).filter(|&owner| owner != self.current);
        self.states[self.current] = SlotState::Recording;
        Ok(previous)
    }

    pub fn mark_submitted(&mut self) {
        self.states[self.current] = SlotState::Submitted;
    }

    /// Move to the next slot, wrapping after the last one.
    pub fn advance(&mut self) -> usize {
        self.current = (self.current + 1) % MAX_FRAMES_IN_FLIGHT;
        self.current
    }

    /// Forget image ownership after the swapchain was rebuilt.
    pub fn reset_images(&mut self, image_count: usize) {
        self.images_in_flight.clear();
        self.images_in_flight.resize(image_count, None);
    }
}
