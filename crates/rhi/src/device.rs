//! Logical device creation.
//!
//! Everything that destroys a Vulkan handle keeps an `Arc<Device>`, so the
//! device outlives its children.
//!
//! # Example
//!
//! ```no_run
//! use frameloop_rhi::instance::Instance;
//! use frameloop_rhi::physical_device::select_physical_device;
//! use frameloop_rhi::device::Device;
//! use ash::vk;
//!
//! # fn example(instance: &Instance, surface: vk::SurfaceKHR) -> Result<(), frameloop_rhi::RhiError> {
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//! let info = select_physical_device(instance.handle(), surface, &surface_loader)?;
//! let device = Device::new(instance, &info)?;
//!
//! assert_eq!(device.queue_families(), info.queue_families);
//! device.wait_idle()?;
//! # Ok(())
//! # }
//! ```

use std::ffi::{CStr, c_char};
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices};

pub(crate) const DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// First queue of a family.
#[derive(Clone, Copy, Debug)]
struct Queue {
    handle: vk::Queue,
    family: u32,
}

impl Queue {
    fn fetch(device: &ash::Device, family: u32) -> Self {
        Self {
            handle: unsafe { device.get_device_queue(family, 0) },
            family,
        }
    }
}

/// Logical device plus the graphics and present queues.
///
/// Queue submission is externally synchronized by Vulkan; the frame loop only
/// submits from the render thread.
pub struct Device {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    graphics: Queue,
    present: Queue,
}

impl Device {
    /// Creates the logical device with one queue per distinct family and the
    /// swapchain extension enabled.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] when `gpu` lacks a graphics or present
    /// family, or the driver error if creation fails.
    pub fn new(instance: &Instance, gpu: &PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let families = gpu.queue_families;
        let (Some(graphics_family), Some(present_family)) =
            (families.graphics_family, families.present_family)
        else {
            return Err(RhiError::InvalidHandle(format!(
                "incomplete queue families: {:?}",
                families
            )));
        };

        let priority = [1.0f32];
        let distinct = families.unique_families();
        let queue_infos: Vec<_> = distinct
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&priority)
            })
            .collect();
        let extensions: Vec<*const c_char> = DEVICE_EXTENSIONS.iter().map(|e| e.as_ptr()).collect();
        let features = vk::PhysicalDeviceFeatures::default();

        let device = unsafe {
            instance.handle().create_device(
                gpu.device,
                &vk::DeviceCreateInfo::default()
                    .queue_create_infos(&queue_infos)
                    .enabled_extension_names(&extensions)
                    .enabled_features(&features),
                None,
            )?
        };

        let graphics = Queue::fetch(&device, graphics_family);
        let present = Queue::fetch(&device, present_family);
        debug!("Device queues: graphics={:?} present={:?}", graphics, present);
        info!("Logical device created (queue families {:?})", distinct);

        Ok(Arc::new(Self {
            device,
            physical_device: gpu.device,
            graphics,
            present,
        }))
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present.handle
    }

    #[inline]
    pub fn graphics_family(&self) -> u32 {
        self.graphics.family
    }

    #[inline]
    pub fn present_family(&self) -> u32 {
        self.present.family
    }

    pub fn queue_families(&self) -> QueueFamilyIndices {
        QueueFamilyIndices {
            graphics_family: Some(self.graphics.family),
            present_family: Some(self.present.family),
        }
    }

    /// Blocks until every queue has drained.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// # Safety
    ///
    /// Command buffers in `submits` must be fully recorded, and `fence`, unless
    /// null, must be unsignaled with no pending use.
    pub unsafe fn submit_graphics(&self, submits: &[vk::SubmitInfo], fence: vk::Fence) -> RhiResult<()> {
        unsafe { self.device.queue_submit(self.graphics.handle, submits, fence)? };
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            error!("Device did not go idle before destruction: {}", e);
        }
        unsafe { self.device.destroy_device(None) };
        info!("Logical device destroyed");
    }
}

// SAFETY: ash::Device is a dispatch table plus a handle and queues are plain
// identifiers. Queue use is confined to the render thread.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}
