//! Device-facing operations the frame scheduler drives.

use std::time::Duration;

use ash::vk;
use frameloop_rhi::RhiResult;
use frameloop_rhi::swapchain::{AcquireResult, RenderTarget, SurfaceStatus};
use frameloop_rhi::sync::FenceStatus;

use crate::stage::SurfaceInfo;

/// Surface, queues and per-slot resources behind a [`FrameScheduler`](crate::FrameScheduler).
///
/// The scheduler owns the slots it creates and hands them back on every
/// call, so the backend never tracks which slot is current.
pub trait FrameBackend {
    /// Per-frame resources: command buffer, two semaphores and a fence.
    type Slot;

    /// Number of images in the current surface.
    fn image_count(&self) -> u32;

    fn surface_info(&self) -> SurfaceInfo;

    /// Builds one slot. The fence must start signaled.
    fn create_slot(&mut self, index: usize) -> RhiResult<Self::Slot>;

    /// Waits up to `timeout` for the slot's fence.
    fn wait_for_fence(&self, slot: &Self::Slot, timeout: Duration) -> RhiResult<FenceStatus>;

    fn reset_fence(&self, slot: &Self::Slot) -> RhiResult<()>;

    /// Acquires the next image, signalling the slot's acquire semaphore.
    fn acquire_next_image(&self, slot: &Self::Slot) -> RhiResult<AcquireResult>;

    /// Resets the slot's command buffer and begins recording into it.
    fn begin_recording(&self, slot: &Self::Slot) -> RhiResult<vk::CommandBuffer>;

    fn end_recording(&self, slot: &Self::Slot) -> RhiResult<()>;

    /// Submits the recorded commands. Waits on the acquire semaphore and
    /// signals the render semaphore and the fence.
    fn submit(&self, slot: &Self::Slot) -> RhiResult<()>;

    /// Submits no work, only consuming the acquire semaphore and signalling
    /// the fence. Used when recording was abandoned after an acquire.
    fn release_acquired(&self, slot: &Self::Slot) -> RhiResult<()>;

    /// Queues `image_index` for presentation after the render semaphore.
    fn present(&self, slot: &Self::Slot, image_index: u32) -> RhiResult<SurfaceStatus>;

    fn render_target(&self, image_index: u32) -> Option<RenderTarget>;

    /// Rebuilds the surface at the given size.
    fn recreate_surface(&mut self, width: u32, height: u32) -> RhiResult<()>;

    fn wait_idle(&self) -> RhiResult<()>;
}
