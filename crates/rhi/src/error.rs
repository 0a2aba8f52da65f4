//! Errors raised by the Vulkan wrappers.

use ash::vk;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RhiError {
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Surface creation, query or extension mismatch.
    #[error("Surface error: {0}")]
    SurfaceError(String),

    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
}

impl RhiError {
    /// Returns true for errors no surface recreation can recover from.
    ///
    /// Lost devices and surfaces, a missing loader and an unusable GPU are
    /// fatal. Everything else (out of memory, swapchain creation hiccups) is
    /// worth another attempt on the next frame.
    pub fn is_fatal(&self) -> bool {
        match self {
            RhiError::VulkanError(result) => matches!(
                *result,
                vk::Result::ERROR_DEVICE_LOST
                    | vk::Result::ERROR_SURFACE_LOST_KHR
                    | vk::Result::ERROR_INITIALIZATION_FAILED
            ),
            RhiError::LoadingError(_) | RhiError::NoSuitableGpu => true,
            RhiError::SurfaceError(_)
            | RhiError::SwapchainError(_)
            | RhiError::InvalidHandle(_) => false,
        }
    }
}

pub type RhiResult<T> = std::result::Result<T, RhiError>;
