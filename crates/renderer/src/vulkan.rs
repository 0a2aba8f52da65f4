//! Vulkan implementation of [`FrameBackend`].

use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use frameloop_core::config::{PresentModePreference, RenderConfig};
use frameloop_platform::{Surface, Window};
use frameloop_rhi::command::{CommandBuffer, CommandPool};
use frameloop_rhi::device::Device;
use frameloop_rhi::instance::Instance;
use frameloop_rhi::physical_device::select_physical_device;
use frameloop_rhi::swapchain::{
    AcquireResult, RenderTarget, SurfaceStatus, Swapchain, SwapchainPreferences,
    VulkanSwapchainBackend,
};
use frameloop_rhi::sync::{Fence, FenceStatus, Semaphore};
use frameloop_rhi::{RhiError, RhiResult};
use tracing::{debug, info};

use crate::backend::FrameBackend;
use crate::stage::SurfaceInfo;

/// Options for bringing up a [`VulkanFrameBackend`].
#[derive(Debug, Clone, Copy, Default)]
pub struct VulkanBackendOptions {
    pub enable_validation: bool,
    pub preferences: SwapchainPreferences,
}

impl From<&RenderConfig> for VulkanBackendOptions {
    fn from(config: &RenderConfig) -> Self {
        let format = if config.srgb {
            vk::Format::B8G8R8A8_SRGB
        } else {
            vk::Format::B8G8R8A8_UNORM
        };
        let present_mode = match config.present_mode {
            PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
            PresentModePreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
        };

        Self {
            enable_validation: config.validation,
            preferences: SwapchainPreferences {
                format,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                present_mode,
            },
        }
    }
}

/// Resources for one frame in flight.
pub struct VulkanFrameSlot {
    command_buffer: CommandBuffer,
    image_acquired: Semaphore,
    render_finished: Semaphore,
    frame_complete: Fence,
    pool: Arc<CommandPool>,
}

impl VulkanFrameSlot {
    fn new(device: &Arc<Device>, pool: &Arc<CommandPool>) -> RhiResult<Self> {
        let command_buffer = CommandBuffer::new(device.clone(), pool)?;
        let image_acquired = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        // Signaled so the first wait on this slot returns immediately
        let frame_complete = Fence::new(device.clone(), true)?;

        Ok(Self {
            command_buffer,
            image_acquired,
            render_finished,
            frame_complete,
            pool: pool.clone(),
        })
    }

}

impl Drop for VulkanFrameSlot {
    fn drop(&mut self) {
        self.pool.free_command_buffer(self.command_buffer.handle());
    }
}

/// Window surface, device, queues and swapchain for the frame scheduler.
///
/// Teardown order is fixed: swapchain, command pool, surface, device, instance.
pub struct VulkanFrameBackend {
    swapchain: ManuallyDrop<Swapchain<VulkanSwapchainBackend>>,
    command_pool: ManuallyDrop<Arc<CommandPool>>,
    surface: ManuallyDrop<Surface>,
    device: ManuallyDrop<Arc<Device>>,
    instance: ManuallyDrop<Instance>,
}

impl VulkanFrameBackend {
    /// Brings Vulkan up for `window` and builds the initial swapchain at the
    /// window's current size.
    ///
    /// # Errors
    ///
    /// Returns an error if any step of instance, device or swapchain creation fails.
    pub fn new(window: &Window, options: &VulkanBackendOptions) -> RhiResult<Self> {
        let surface_extensions = window
            .required_extensions()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;
        let instance = Instance::new(c"frameloop", options.enable_validation, &surface_extensions)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let gpu = select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        info!(
            "Selected GPU: {} ({})",
            gpu.device_name(),
            gpu.device_type_name()
        );

        let device = Device::new(&instance, &gpu)?;
        let command_pool = Arc::new(CommandPool::new(device.clone(), device.graphics_family())?);

        let mut swapchain = Swapchain::new(
            VulkanSwapchainBackend::new(&instance, device.clone()),
            surface.handle(),
            options.preferences,
        );
        let (width, height) = window.size();
        swapchain.create(width, height)?;

        Ok(Self {
            swapchain: ManuallyDrop::new(swapchain),
            command_pool: ManuallyDrop::new(command_pool),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
            instance: ManuallyDrop::new(instance),
        })
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl FrameBackend for VulkanFrameBackend {
    type Slot = VulkanFrameSlot;

    fn image_count(&self) -> u32 {
        self.swapchain.image_count()
    }

    fn surface_info(&self) -> SurfaceInfo {
        SurfaceInfo {
            extent: self.swapchain.extent(),
            format: self.swapchain.format(),
            image_count: self.swapchain.image_count(),
            render_pass: self.swapchain.render_pass(),
        }
    }

    fn create_slot(&mut self, index: usize) -> RhiResult<VulkanFrameSlot> {
        let slot = VulkanFrameSlot::new(&self.device, &self.command_pool)?;
        debug!("Allocated Vulkan frame slot {}", index);
        Ok(slot)
    }

    fn wait_for_fence(&self, slot: &VulkanFrameSlot, timeout: Duration) -> RhiResult<FenceStatus> {
        slot.frame_complete.wait_timeout(timeout)
    }

    fn reset_fence(&self, slot: &VulkanFrameSlot) -> RhiResult<()> {
        slot.frame_complete.reset()
    }

    fn acquire_next_image(&self, slot: &VulkanFrameSlot) -> RhiResult<AcquireResult> {
        self.swapchain.acquire_next(slot.image_acquired.handle())
    }

    fn begin_recording(&self, slot: &VulkanFrameSlot) -> RhiResult<vk::CommandBuffer> {
        slot.command_buffer.reset()?;
        slot.command_buffer.begin()?;
        Ok(slot.command_buffer.handle())
    }

    fn end_recording(&self, slot: &VulkanFrameSlot) -> RhiResult<()> {
        slot.command_buffer.end()
    }

    fn submit(&self, slot: &VulkanFrameSlot) -> RhiResult<()> {
        let wait_semaphores = [slot.image_acquired.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [slot.command_buffer.handle()];
        let signal_semaphores = [slot.render_finished.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: The command buffer was fully recorded by end_recording and the
        // fence was reset by the scheduler before this frame was acquired.
        unsafe {
            self.device
                .submit_graphics(&[submit_info], slot.frame_complete.handle())
        }
    }

    fn release_acquired(&self, slot: &VulkanFrameSlot) -> RhiResult<()> {
        let wait_semaphores = [slot.image_acquired.handle()];
        let wait_stages = [vk::PipelineStageFlags::ALL_COMMANDS];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages);

        // SAFETY: No command buffers are referenced, and the fence is unsignaled
        // because the scheduler reset it before acquiring.
        unsafe {
            self.device
                .submit_graphics(&[submit_info], slot.frame_complete.handle())
        }
    }

    fn present(&self, slot: &VulkanFrameSlot, image_index: u32) -> RhiResult<SurfaceStatus> {
        self.swapchain
            .present(image_index, slot.render_finished.handle())
    }

    fn render_target(&self, image_index: u32) -> Option<RenderTarget> {
        self.swapchain.render_target(image_index)
    }

    fn recreate_surface(&mut self, width: u32, height: u32) -> RhiResult<()> {
        self.swapchain.recreate(width, height)
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.device.wait_idle()
    }
}

impl Drop for VulkanFrameBackend {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            tracing::error!("Failed to wait for device idle during drop: {:?}", e);
        }

        // SAFETY: Each field is dropped exactly once, here, and never used
        // again. Children go before the objects they were created from.
        unsafe {
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.command_pool);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Vulkan frame backend destroyed");
    }
}
