//! Frame scheduling on top of the presentation surface.
//!
//! This crate drives one frame per host update:
//! - [`FrameSlotPool`]: per-in-flight-frame command buffers, semaphores and fences
//! - [`FrameScheduler`]: wait, acquire, record, submit, present, rotate, and
//!   surface recreation when the surface is invalidated
//! - [`RenderStage`]: the contract render passes implement to record into a frame
//! - [`VulkanFrameBackend`]: the Vulkan implementation of [`FrameBackend`]

mod backend;
mod error;
mod frame_slots;
mod invalidation;
mod scheduler;
mod stage;
mod vulkan;

pub use backend::FrameBackend;
pub use error::{FrameError, TickOutcome};
pub use frame_slots::{FrameSlotPool, MAX_FRAMES_IN_FLIGHT, frames_in_flight_for};
pub use invalidation::SurfaceInvalidator;
pub use scheduler::{FrameScheduler, SchedulerConfig};
pub use stage::{
    FrameContext, RenderStage, StageError, StageKind, StageRegistry, StageResult, SurfaceInfo,
};
pub use vulkan::{VulkanBackendOptions, VulkanFrameBackend, VulkanFrameSlot};
