//! Per-update frame scheduling.
//!
//! One [`FrameScheduler::tick`] renders at most one frame:
//!
//! 1. Rebuild the surface if it was invalidated, and stop there
//! 2. Wait on the current slot's fence, then reset it
//! 3. Acquire an image; an out-of-date or suboptimal surface skips the frame
//! 4. Reset and begin the slot's command buffer
//! 5. Record every registered stage in order
//! 6. End recording and submit
//! 7. Present
//! 8. Advance to the next slot
//!
//! Skipped frames still advance the slot cursor. A zero-size surface pauses
//! the tick before step 1: nothing is touched and the cursor stays put until
//! the surface has an area again. Fatal errors are returned to
//! the caller; everything else is logged, reported in the [`TickOutcome`] and
//! healed by a surface rebuild on the next tick.

use std::time::Duration;

use frameloop_core::config::RenderConfig;
use frameloop_rhi::swapchain::AcquireResult;
use frameloop_rhi::sync::FenceStatus;
use frameloop_rhi::{RhiError, RhiResult};
use tracing::{debug, error, info, warn};

use crate::backend::FrameBackend;
use crate::error::{FrameError, TickOutcome};
use crate::frame_slots::{FrameSlotPool, frames_in_flight_for};
use crate::invalidation::SurfaceInvalidator;
use crate::stage::{FrameContext, RenderStage, StageKind, StageRegistry};

/// Tuning for [`FrameScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// How long a single fence wait may take before a warning is logged.
    /// The scheduler keeps waiting afterwards.
    pub fence_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fence_timeout: Duration::from_secs(1),
        }
    }
}

impl From<&RenderConfig> for SchedulerConfig {
    fn from(config: &RenderConfig) -> Self {
        Self {
            fence_timeout: config.fence_timeout(),
        }
    }
}

/// Drives the frame loop on one thread.
///
/// All methods take `&mut self`; only the [`SurfaceInvalidator`] handle is
/// meant to be shared with other threads.
pub struct FrameScheduler<B: FrameBackend> {
    pool: FrameSlotPool<B::Slot>,
    stages: StageRegistry,
    invalidator: SurfaceInvalidator,
    config: SchedulerConfig,
    backend: B,
}

impl<B: FrameBackend> FrameScheduler<B> {
    /// Creates a scheduler over a backend whose surface is already built.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface has no images or a slot cannot be created.
    pub fn new(mut backend: B, config: SchedulerConfig) -> RhiResult<Self> {
        let surface = backend.surface_info();
        let pool = allocate_pool(&mut backend)?;
        info!(
            "Frame scheduler started: {} frames in flight over {} images",
            pool.len(),
            surface.image_count
        );

        Ok(Self {
            pool,
            stages: StageRegistry::new(),
            invalidator: SurfaceInvalidator::new(surface.extent.width, surface.extent.height),
            config,
            backend,
        })
    }

    /// Adds a stage to every following frame.
    pub fn register_stage(&mut self, kind: StageKind, stage: impl RenderStage + 'static) {
        self.stages.register(kind, Box::new(stage));
    }

    /// Handle for requesting a surface rebuild from anywhere.
    pub fn invalidator(&self) -> SurfaceInvalidator {
        self.invalidator.clone()
    }

    /// Requests a surface rebuild at the start of the next tick.
    #[inline]
    pub fn mark_surface_invalid(&self) {
        self.invalidator.mark_invalid();
    }

    /// True if the next tick will rebuild the surface.
    #[inline]
    pub fn recreate_pending(&self) -> bool {
        self.invalidator.is_invalid()
    }

    /// Index of the slot the next frame will use.
    #[inline]
    pub fn current_frame_index(&self) -> usize {
        self.pool.current_index()
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.pool.len()
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn stages(&self) -> &StageRegistry {
        &self.stages
    }

    /// Runs one frame.
    ///
    /// Returns [`TickOutcome::Paused`] without rotating slots while the size
    /// hint has a zero dimension.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Fatal`] when the device or surface is gone. The
    /// scheduler should not be ticked again after that.
    pub fn tick(&mut self) -> Result<TickOutcome, FrameError> {
        let (width, height) = self.invalidator.size_hint();
        if width == 0 || height == 0 {
            return Ok(TickOutcome::Paused);
        }

        let result = if self.invalidator.take() {
            self.recreate(width, height)
        } else {
            self.render_frame()
        };

        self.pool.advance();

        match result {
            Ok(outcome) => Ok(outcome),
            Err(err) if err.is_fatal() => {
                error!("Frame loop stopped: {}", err);
                Err(err)
            }
            Err(err) => {
                warn!("Frame skipped: {}", err);
                Ok(TickOutcome::Skipped(err))
            }
        }
    }

    fn recreate(&mut self, width: u32, height: u32) -> Result<TickOutcome, FrameError> {
        debug!("Recreating surface at {}x{}", width, height);

        if let Err(err) = self.backend.recreate_surface(width, height) {
            if err.is_fatal() {
                return Err(FrameError::Fatal(err));
            }
            self.invalidator.mark_invalid();
            return Err(FrameError::Recreation(err));
        }

        // The backend idled the device, so no slot is in use.
        self.pool = FrameSlotPool::empty();
        self.pool = allocate_pool(&mut self.backend).map_err(FrameError::Fatal)?;

        let surface = self.backend.surface_info();
        self.stages.surface_recreated(&surface);

        info!(
            "Surface recreated: {}x{}, {} images, {} frames in flight",
            surface.extent.width,
            surface.extent.height,
            surface.image_count,
            self.pool.len()
        );

        Ok(TickOutcome::Recreated {
            frames_in_flight: self.pool.len(),
        })
    }

    fn render_frame(&mut self) -> Result<TickOutcome, FrameError> {
        let frame_index = self.pool.current_index();
        let slot = self.pool.current().ok_or_else(|| {
            FrameError::Fatal(RhiError::InvalidHandle("no frame slots".to_string()))
        })?;

        self.wait_for_slot(slot, frame_index)?;
        self.backend
            .reset_fence(slot)
            .map_err(FrameError::Fatal)?;

        let image_index = match self.backend.acquire_next_image(slot) {
            Ok(AcquireResult::Ok(index)) => index,
            Ok(acquired @ AcquireResult::Suboptimal(_)) => {
                // The semaphore will still signal; consume it before rebuilding.
                let err = FrameError::SurfaceInvalidated(acquired.status());
                return Err(self.abandon(slot, err));
            }
            Ok(AcquireResult::OutOfDate) => {
                self.invalidator.mark_invalid();
                return Err(FrameError::SurfaceInvalidated(
                    AcquireResult::OutOfDate.status(),
                ));
            }
            Err(err) => return Err(FrameError::Fatal(err)),
        };

        let command_buffer = match self.backend.begin_recording(slot) {
            Ok(command_buffer) => command_buffer,
            Err(err) => return Err(self.abandon(slot, FrameError::recording("begin", err))),
        };

        let Some(target) = self.backend.render_target(image_index) else {
            let err = RhiError::InvalidHandle(format!("no render target for image {image_index}"));
            return Err(self.abandon(slot, FrameError::recording("begin", err)));
        };

        let frame = FrameContext {
            frame_index,
            image_index,
            command_buffer,
            target,
        };

        if let Err(err) = self.stages.record_all(&frame) {
            return Err(self.abandon(slot, err));
        }

        if let Err(err) = self.backend.end_recording(slot) {
            return Err(self.abandon(slot, FrameError::recording("end", err)));
        }

        if let Err(err) = self.backend.submit(slot) {
            if err.is_fatal() {
                return Err(FrameError::Fatal(err));
            }
            self.invalidator.mark_invalid();
            return Err(FrameError::Submission(err));
        }

        let status = self
            .backend
            .present(slot, image_index)
            .map_err(FrameError::Fatal)?;
        if status.needs_recreate() {
            debug!("Present reported {:?}", status);
            self.invalidator.mark_invalid();
        }

        Ok(TickOutcome::Presented {
            frame_index,
            image_index,
            status,
        })
    }

    fn wait_for_slot(&self, slot: &B::Slot, frame_index: usize) -> Result<(), FrameError> {
        let mut waited = Duration::ZERO;
        loop {
            match self.backend.wait_for_fence(slot, self.config.fence_timeout) {
                Ok(FenceStatus::Signaled) => return Ok(()),
                Ok(FenceStatus::TimedOut) => {
                    waited += self.config.fence_timeout;
                    warn!(
                        "Frame slot {} still in flight after {:?}",
                        frame_index, waited
                    );
                }
                Err(err) => return Err(FrameError::Fatal(err)),
            }
        }
    }

    /// Returns an acquired but unrendered slot to a reusable state and
    /// schedules a rebuild so the image goes back to the surface.
    fn abandon(&self, slot: &B::Slot, err: FrameError) -> FrameError {
        if let Err(release) = self.backend.release_acquired(slot) {
            if release.is_fatal() {
                return FrameError::Fatal(release);
            }
            warn!("Failed to release abandoned frame slot: {}", release);
        }
        self.invalidator.mark_invalid();
        err
    }
}

impl<B: FrameBackend> Drop for FrameScheduler<B> {
    fn drop(&mut self) {
        if let Err(e) = self.backend.wait_idle() {
            error!("Failed to wait for device idle during drop: {:?}", e);
        }
        // Slots and stages may hold device objects; release them before the backend.
        self.pool = FrameSlotPool::empty();
        self.stages.clear();
        debug!("Frame scheduler destroyed");
    }
}

fn allocate_pool<B: FrameBackend>(backend: &mut B) -> RhiResult<FrameSlotPool<B::Slot>> {
    let count = frames_in_flight_for(backend.image_count());
    FrameSlotPool::allocate(count, |index| backend.create_slot(index))
}
