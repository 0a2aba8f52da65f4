//! Command recording.
//!
//! One [`CommandPool`] serves the graphics family. Each frame slot allocates
//! a single primary buffer from it and records through [`CommandBuffer`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use frameloop_rhi::device::Device;
//! use frameloop_rhi::command::{CommandPool, CommandBuffer};
//!
//! # fn example(device: Arc<Device>) -> Result<(), frameloop_rhi::RhiError> {
//! let pool = CommandPool::new(device.clone(), device.graphics_family())?;
//! let cmd = CommandBuffer::new(device.clone(), &pool)?;
//! cmd.begin()?;
//! cmd.end()?;
//! pool.free_command_buffer(cmd.handle());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// `RESET_COMMAND_BUFFER` pool: slots reset their own buffer independently.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
    family: u32,
}

impl CommandPool {
    pub fn new(device: Arc<Device>, family: u32) -> RhiResult<Self> {
        let info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let pool = unsafe { device.handle().create_command_pool(&info, None)? };
        debug!(?pool, family, "Command pool created");

        Ok(Self {
            device,
            pool,
            family,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.family
    }

    pub fn allocate_command_buffer(&self) -> RhiResult<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        unsafe { self.device.handle().allocate_command_buffers(&info)? }
            .pop()
            .ok_or_else(|| RhiError::InvalidHandle("driver returned no command buffer".into()))
    }

    /// `buffer` must not be pending execution.
    pub fn free_command_buffer(&self, buffer: vk::CommandBuffer) {
        unsafe { self.device.handle().free_command_buffers(self.pool, &[buffer]) };
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_command_pool(self.pool, None) };
        debug!(pool = ?self.pool, "Command pool destroyed");
    }
}

/// Borrowed view of a primary command buffer.
///
/// Freeing stays with whoever allocated the handle.
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    pub fn new(device: Arc<Device>, pool: &CommandPool) -> RhiResult<Self> {
        let buffer = pool.allocate_command_buffer()?;
        Ok(Self::from_handle(device, buffer))
    }

    #[inline]
    pub fn from_handle(device: Arc<Device>, buffer: vk::CommandBuffer) -> Self {
        Self { device, buffer }
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    #[inline]
    fn raw(&self) -> &ash::Device {
        self.device.handle()
    }

    /// Recording for a single submission.
    pub fn begin(&self) -> RhiResult<()> {
        let info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.raw().begin_command_buffer(self.buffer, &info)? };
        Ok(())
    }

    pub fn end(&self) -> RhiResult<()> {
        unsafe { self.raw().end_command_buffer(self.buffer)? };
        Ok(())
    }

    /// The buffer must not be pending execution.
    pub fn reset(&self) -> RhiResult<()> {
        let flags = vk::CommandBufferResetFlags::empty();
        unsafe { self.raw().reset_command_buffer(self.buffer, flags)? };
        Ok(())
    }

    /// Inline-contents pass covering all of `framebuffer`.
    ///
    /// `clear_values` holds one entry per attachment cleared on load.
    pub fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    ) {
        let info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(extent.into())
            .clear_values(clear_values);
        unsafe {
            self.raw()
                .cmd_begin_render_pass(self.buffer, &info, vk::SubpassContents::INLINE)
        };
    }

    pub fn end_render_pass(&self) {
        unsafe { self.raw().cmd_end_render_pass(self.buffer) };
    }
}
