//! Thin RAII wrappers over `ash` for the pieces a frame loop touches.
//!
//! [`swapchain::Swapchain`] is the presentation surface manager; it talks to
//! Vulkan through [`swapchain::SwapchainBackend`] so it can be driven without
//! a GPU. The remaining modules wrap instance and device setup, command
//! recording and fences/semaphores.

mod error;

pub mod command;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult};
pub use ash::vk;
