//! Frames-in-flight slot pool.
//!
//! Each in-flight frame owns one slot: a command buffer, an "image acquired"
//! semaphore, a "render finished" semaphore and a "frame complete" fence.
//! While the GPU works on the frame in one slot, the CPU records into the
//! next.
//!
//! ```text
//! 1. Wait on frame_complete (previous use of this slot is done)
//! 2. Acquire an image (signals image_acquired)
//! 3. Record into the command buffer
//! 4. Submit: wait image_acquired, signal render_finished and frame_complete
//! 5. Present (waits on render_finished)
//! ```
//!
//! The pool itself is generic over the slot type so the rotation logic can
//! run without a device.

use frameloop_rhi::{RhiError, RhiResult};
use tracing::debug;

/// Upper bound on frames recorded ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Number of slots to allocate for a surface with `image_count` images.
///
/// Never more slots than images, since a slot holds at most one acquired
/// image at a time.
#[inline]
pub fn frames_in_flight_for(image_count: u32) -> usize {
    (image_count as usize).min(MAX_FRAMES_IN_FLIGHT)
}

/// Fixed-size ring of frame slots with a cursor.
pub struct FrameSlotPool<S> {
    slots: Vec<S>,
    current: usize,
}

impl<S> FrameSlotPool<S> {
    /// Builds `count` slots with `create`, starting the cursor at slot 0.
    ///
    /// # Errors
    ///
    /// Returns an error if `count` is zero or above [`MAX_FRAMES_IN_FLIGHT`],
    /// or if any slot fails to build. Slots built so far are dropped.
    pub fn allocate<F>(count: usize, mut create: F) -> RhiResult<Self>
    where
        F: FnMut(usize) -> RhiResult<S>,
    {
        if count == 0 || count > MAX_FRAMES_IN_FLIGHT {
            return Err(RhiError::SwapchainError(format!(
                "cannot run {} frames in flight (allowed 1..={})",
                count, MAX_FRAMES_IN_FLIGHT
            )));
        }

        let mut slots = Vec::with_capacity(count);
        for index in 0..count {
            slots.push(create(index)?);
            debug!("Created frame slot {}", index);
        }

        Ok(Self { slots, current: 0 })
    }

    /// A pool without slots. Only valid as a placeholder while a
    /// replacement is being built.
    pub(crate) fn empty() -> Self {
        Self {
            slots: Vec::new(),
            current: 0,
        }
    }

    /// Returns the slot under the cursor.
    #[inline]
    pub fn current(&self) -> Option<&S> {
        self.slots.get(self.current)
    }

    #[inline]
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Moves the cursor to the next slot, wrapping around.
    #[inline]
    pub fn advance(&mut self) {
        if !self.slots.is_empty() {
            self.current = (self.current + 1) % self.slots.len();
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &S> {
        self.slots.iter()
    }
}
