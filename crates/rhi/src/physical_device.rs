//! Physical device (GPU) selection.
//!
//! A GPU is usable when it has:
//! 1. A graphics queue family and a queue family that can present to the surface
//! 2. The swapchain device extension
//! 3. At least one surface format and one present mode for the surface
//!
//! Among usable GPUs, discrete ones are preferred.

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::DEVICE_EXTENSIONS;
use crate::error::{RhiError, RhiResult};
use crate::swapchain::SwapchainSupportDetails;

/// Queue family indices needed for rendering and presentation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Index of the queue family that supports graphics operations.
    pub graphics_family: Option<u32>,
    /// Index of the queue family that supports presentation to the surface.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Checks if both graphics and present families were found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Returns the distinct family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);

        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }

        families
    }

    /// True when presentation happens on a different family than rendering.
    ///
    /// Swapchain images then need `CONCURRENT` sharing.
    #[inline]
    pub fn is_split(&self) -> bool {
        self.graphics_family != self.present_family
    }
}

/// A GPU that passed the suitability checks.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Supported API version formatted as `major.minor.patch`.
    pub fn api_version(&self) -> String {
        let v = self.properties.api_version;
        format!(
            "{}.{}.{}",
            vk::api_version_major(v),
            vk::api_version_minor(v),
            vk::api_version_patch(v)
        )
    }

    /// Sum of all `DEVICE_LOCAL` heaps, in bytes.
    pub fn device_local_memory(&self) -> u64 {
        let count = self.memory_properties.memory_heap_count as usize;
        self.memory_properties
            .memory_heaps
            .iter()
            .take(count)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }

    fn rank(&self) -> DeviceRank {
        DeviceRank {
            type_rank: match self.properties.device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => 4,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
                vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
                vk::PhysicalDeviceType::CPU => 1,
                _ => 0,
            },
            shared_present: !self.queue_families.is_split(),
            local_memory_mb: self.device_local_memory() / (1024 * 1024),
            max_image_dimension: self.properties.limits.max_image_dimension2_d,
        }
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &self.api_version())
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Ordering key between suitable GPUs; fields compare in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct DeviceRank {
    type_rank: u8,
    /// Presenting from the graphics family keeps swapchain images exclusive.
    shared_present: bool,
    local_memory_mb: u64,
    max_image_dimension: u32,
}

/// Why a GPU was passed over.
#[derive(Debug, thiserror::Error)]
enum Rejection {
    #[error("missing queue families (graphics={graphics}, present={present})")]
    QueueFamilies { graphics: bool, present: bool },
    #[error("swapchain extension not supported")]
    NoSwapchain,
    #[error("no surface formats or present modes")]
    InadequateSurface,
    #[error("surface query failed: {0}")]
    SurfaceQuery(RhiError),
}

/// Picks the best GPU that can render to and present on `surface`.
///
/// # Errors
///
/// [`RhiError::NoSuitableGpu`] when every GPU is rejected.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    info!("Found {} GPU(s)", devices.len());

    let best = devices
        .into_iter()
        .filter_map(|device| {
            match inspect_device(instance, device, surface, surface_loader) {
                Ok(candidate) => {
                    debug!(
                        "GPU '{}' ({}) is suitable: {:?}",
                        candidate.device_name(),
                        candidate.device_type_name(),
                        candidate.rank()
                    );
                    Some(candidate)
                }
                Err((name, reason)) => {
                    debug!("GPU '{}' skipped: {}", name, reason);
                    None
                }
            }
        })
        .max_by_key(PhysicalDeviceInfo::rank);

    let Some(selected) = best else {
        warn!("No GPU offers graphics, presentation and a swapchain for this surface");
        return Err(RhiError::NoSuitableGpu);
    };

    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}",
        selected.device_name(),
        selected.device_type_name(),
        selected.api_version()
    );

    Ok(selected)
}

fn inspect_device(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, (String, Rejection)> {
    let candidate = PhysicalDeviceInfo {
        device,
        properties: unsafe { instance.get_physical_device_properties(device) },
        memory_properties: unsafe { instance.get_physical_device_memory_properties(device) },
        queue_families: find_queue_families(instance, device, surface, surface_loader),
    };

    match check_suitability(instance, &candidate, surface, surface_loader) {
        Ok(()) => Ok(candidate),
        Err(reason) => Err((candidate.device_name().to_owned(), reason)),
    }
}

fn check_suitability(
    instance: &ash::Instance,
    candidate: &PhysicalDeviceInfo,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<(), Rejection> {
    let families = &candidate.queue_families;
    if !families.is_complete() {
        return Err(Rejection::QueueFamilies {
            graphics: families.graphics_family.is_some(),
            present: families.present_family.is_some(),
        });
    }

    let extensions = unsafe { instance.enumerate_device_extension_properties(candidate.device) }
        .unwrap_or_default();
    let has_swapchain = DEVICE_EXTENSIONS.iter().all(|required| {
        extensions
            .iter()
            .any(|ext| ext.extension_name_as_c_str() == Ok(*required))
    });
    if !has_swapchain {
        return Err(Rejection::NoSwapchain);
    }

    match SwapchainSupportDetails::query(candidate.device, surface, surface_loader) {
        Ok(support) if support.is_adequate() => Ok(()),
        Ok(_) => Err(Rejection::InadequateSurface),
        Err(e) => Err(Rejection::SurfaceQuery(e)),
    }
}

/// Finds the graphics family and a present-capable family.
fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> QueueFamilyIndices {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let present_support: Vec<bool> = (0..families.len() as u32)
        .map(|i| unsafe {
            surface_loader
                .get_physical_device_surface_support(device, i, surface)
                .unwrap_or(false)
        })
        .collect();

    pick_queue_families(&families, &present_support)
}

/// A family that does both graphics and present wins outright; otherwise the
/// first of each kind is taken.
fn pick_queue_families(
    families: &[vk::QueueFamilyProperties],
    present_support: &[bool],
) -> QueueFamilyIndices {
    let usable = || {
        families
            .iter()
            .enumerate()
            .filter(|(_, family)| family.queue_count > 0)
            .map(|(i, family)| {
                let graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
                let present = present_support.get(i).copied().unwrap_or(false);
                (i as u32, graphics, present)
            })
    };

    if let Some((i, _, _)) = usable().find(|&(_, graphics, present)| graphics && present) {
        return QueueFamilyIndices {
            graphics_family: Some(i),
            present_family: Some(i),
        };
    }

    QueueFamilyIndices {
        graphics_family: usable().find(|&(_, g, _)| g).map(|(i, _, _)| i),
        present_family: usable().find(|&(_, _, p)| p).map(|(i, _, _)| i),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn info_with(device_type: vk::PhysicalDeviceType, split: bool) -> PhysicalDeviceInfo {
        PhysicalDeviceInfo {
            device: vk::PhysicalDevice::null(),
            properties: vk::PhysicalDeviceProperties {
                device_type,
                ..Default::default()
            },
            memory_properties: vk::PhysicalDeviceMemoryProperties::default(),
            queue_families: QueueFamilyIndices {
                graphics_family: Some(0),
                present_family: Some(if split { 1 } else { 0 }),
            },
        }
    }

    #[test]
    fn test_queue_family_indices_default() {
        let indices = QueueFamilyIndices::default();
        assert!(!indices.is_complete());
        assert!(indices.unique_families().is_empty());
    }

    #[test]
    fn test_unique_families_with_duplicates() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert!(indices.is_complete());
        assert!(!indices.is_split());
        assert_eq!(indices.unique_families(), vec![0]);
    }

    #[test]
    fn test_unique_families_split() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(2),
        };
        assert!(indices.is_split());
        assert_eq!(indices.unique_families(), vec![0, 2]);
    }

    #[test]
    fn test_pick_prefers_family_that_does_both() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let present = [false, true, true];

        let indices = pick_queue_families(&families, &present);
        assert_eq!(indices.graphics_family, Some(2));
        assert_eq!(indices.present_family, Some(2));
    }

    #[test]
    fn test_pick_falls_back_to_split_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let present = [false, true];

        let indices = pick_queue_families(&families, &present);
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(1));
    }

    #[test]
    fn test_pick_skips_empty_families() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let families = [empty, family(vk::QueueFlags::GRAPHICS)];

        let indices = pick_queue_families(&families, &[true, true]);
        assert_eq!(indices.graphics_family, Some(1));
    }

    #[test]
    fn test_rank_prefers_discrete_then_shared_present() {
        let discrete = info_with(vk::PhysicalDeviceType::DISCRETE_GPU, false).rank();
        let integrated = info_with(vk::PhysicalDeviceType::INTEGRATED_GPU, false).rank();
        let discrete_split = info_with(vk::PhysicalDeviceType::DISCRETE_GPU, true).rank();

        assert!(discrete > integrated);
        assert!(discrete > discrete_split);
        assert!(discrete_split > integrated);
    }

    #[test]
    fn test_blank_properties_describe_cleanly() {
        let info = info_with(vk::PhysicalDeviceType::CPU, false);
        assert_eq!(info.device_name(), "");
        assert_eq!(info.device_type_name(), "CPU");
        assert_eq!(info.api_version(), "0.0.0");
    }
}
