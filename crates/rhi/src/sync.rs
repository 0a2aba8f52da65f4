//! Semaphores and fences.
//!
//! - [`Semaphore`] orders GPU work against GPU work (acquire, submit, present).
//! - [`Fence`] lets the CPU observe GPU completion.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use frameloop_rhi::device::Device;
//! use frameloop_rhi::sync::{Fence, FenceStatus, Semaphore};
//!
//! # fn example(device: Arc<Device>) -> Result<(), frameloop_rhi::RhiError> {
//! let image_acquired = Semaphore::new(device.clone())?;
//!
//! // Signaled so the first wait returns immediately
//! let frame_complete = Fence::new(device.clone(), true)?;
//!
//! while frame_complete.wait_timeout(Duration::from_secs(1))? == FenceStatus::TimedOut {}
//! frame_complete.reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::trace;

use crate::device::Device;
use crate::error::RhiResult;

/// Outcome of a bounded fence wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    Signaled,
    /// The timeout expired first; the fence is still unsignaled.
    TimedOut,
}

impl FenceStatus {
    /// Maps the result of `vkWaitForFences`. `TIMEOUT` is not an error here.
    pub fn from_wait(result: Result<(), vk::Result>) -> RhiResult<Self> {
        match result {
            Ok(()) => Ok(FenceStatus::Signaled),
            Err(vk::Result::TIMEOUT) => Ok(FenceStatus::TimedOut),
            Err(e) => Err(e.into()),
        }
    }
}

/// Nanosecond timeout for Vulkan waits. Saturates to an infinite wait.
pub fn timeout_nanos(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

/// Binary semaphore, created unsignaled and destroyed on drop.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let semaphore = unsafe {
            device
                .handle()
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };
        trace!("Semaphore {:?} created", semaphore);
        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Host-visible completion signal for a queue submission.
///
/// Each frame slot's fence bounds how far the CPU may run ahead of the GPU.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence, optionally already signaled so the first wait on it
    /// returns immediately.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let fence = unsafe {
            device
                .handle()
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)?
        };
        trace!("Fence {:?} created (signaled: {})", fence, signaled);

        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` passes.
    ///
    /// # Errors
    ///
    /// Any wait failure other than the timeout, most notably `ERROR_DEVICE_LOST`.
    pub fn wait_timeout(&self, timeout: Duration) -> RhiResult<FenceStatus> {
        FenceStatus::from_wait(unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout_nanos(timeout))
        })
    }

    /// Returns the fence to unsignaled. No pending submission may use it.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.fence])? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}
