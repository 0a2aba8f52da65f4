//! Frame-level error taxonomy.

use frameloop_rhi::RhiError;
use frameloop_rhi::swapchain::SurfaceStatus;
use thiserror::Error;

use crate::stage::StageError;

/// Why a tick did not produce a presented frame.
///
/// Everything except [`FrameError::Fatal`] is absorbed by the scheduler: the
/// frame is skipped, the slot rotates, and the surface is rebuilt on the
/// next tick.
#[derive(Error, Debug)]
pub enum FrameError {
    /// Acquire reported the surface out of date or suboptimal.
    #[error("surface invalidated ({0:?})")]
    SurfaceInvalidated(SurfaceStatus),

    /// A render stage or command buffer recording failed. Nothing was submitted.
    #[error("recording failed in '{stage}': {source}")]
    Recording {
        stage: String,
        #[source]
        source: StageError,
    },

    /// The queue rejected the recorded work.
    #[error("queue submission failed: {0}")]
    Submission(#[source] RhiError),

    /// Rebuilding the surface failed; retried on the next tick.
    #[error("surface recreation failed: {0}")]
    Recreation(#[source] RhiError),

    /// Device or surface loss and other unexpected platform failures.
    #[error("fatal platform error: {0}")]
    Fatal(#[source] RhiError),
}

impl FrameError {
    pub(crate) fn recording(stage: impl Into<String>, source: impl Into<StageError>) -> Self {
        FrameError::Recording {
            stage: stage.into(),
            source: source.into(),
        }
    }

    /// True only for errors the host has to handle.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, FrameError::Fatal(_))
    }
}

/// What a single [`FrameScheduler::tick`](crate::FrameScheduler::tick) did.
#[derive(Debug)]
pub enum TickOutcome {
    /// A frame was submitted and queued for presentation.
    Presented {
        frame_index: usize,
        image_index: u32,
        /// Present result; anything but `Ok` schedules a recreation.
        status: SurfaceStatus,
    },
    /// The surface and the slot pool were rebuilt; nothing was rendered.
    Recreated { frames_in_flight: usize },
    /// The window has no area; the tick did nothing.
    Paused,
    /// The frame was dropped for a recoverable reason.
    Skipped(FrameError),
}

impl TickOutcome {
    #[inline]
    pub fn is_presented(&self) -> bool {
        matches!(self, TickOutcome::Presented { .. })
    }
}
