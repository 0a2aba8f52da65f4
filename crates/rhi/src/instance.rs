//! Vulkan instance management.
//!
//! The [`Instance`] owns the loader entry, the VkInstance and, when validation
//! is requested and installed, a debug messenger that forwards validation
//! messages into `tracing`.
//!
//! # Example
//!
//! ```no_run
//! use frameloop_rhi::instance::Instance;
//!
//! // Surface extensions normally come from the windowing layer
//! let extensions = [ash::khr::surface::NAME.as_ptr()];
//! let instance = Instance::new(c"frameloop", cfg!(debug_assertions), &extensions)
//!     .expect("Failed to create Vulkan instance");
//! ```

use std::borrow::Cow;
use std::ffi::{CStr, c_char, c_void};

use ash::{Entry, vk};
use tracing::{Level, debug, error, info, trace, warn};

use crate::error::{RhiError, RhiResult};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// API version requested from the driver.
pub const API_VERSION: u32 = vk::API_VERSION_1_1;

/// Debug-utils loader plus the messenger created from it.
struct ValidationMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl ValidationMessenger {
    fn new(entry: &Entry, instance: &ash::Instance) -> RhiResult<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(forward_validation_message));

        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None)? };
        Ok(Self { loader, messenger })
    }

    /// # Safety
    ///
    /// Must run before the instance it was created from is destroyed.
    unsafe fn destroy(&self) {
        unsafe {
            self.loader
                .destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

/// Vulkan instance with optional validation.
///
/// Destroyed on drop; every object created from it must be gone by then.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    validation: Option<ValidationMessenger>,
}

impl Instance {
    /// Loads Vulkan and creates an instance.
    ///
    /// # Arguments
    ///
    /// * `app_name` - Application name reported to the driver
    /// * `enable_validation` - Enable the Khronos validation layer if it is installed
    /// * `surface_extensions` - Instance extensions the host window needs
    ///
    /// # Errors
    ///
    /// Returns an error if the loader is missing, a surface extension is not
    /// supported, or instance creation fails.
    pub fn new(
        app_name: &CStr,
        enable_validation: bool,
        surface_extensions: &[*const c_char],
    ) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        let validation = enable_validation && validation_layer_installed(&entry)?;
        if enable_validation && !validation {
            warn!("Validation requested but {:?} is not installed", VALIDATION_LAYER);
        }

        let mut extensions = merge_surface_extensions(surface_extensions);
        if validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }
        check_extensions_supported(&entry, &extensions)?;

        let layers = if validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let app_info = vk::ApplicationInfo::default()
            .application_name(app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"frameloop")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(API_VERSION);

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        let validation = if validation {
            match ValidationMessenger::new(&entry, &instance) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        info!(
            "Vulkan instance created ({} extensions, validation {})",
            extensions.len(),
            if validation.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            entry,
            instance,
            validation,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// True if validation messages are being forwarded.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.validation.is_some()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some(validation) = &self.validation {
                validation.destroy();
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// `VK_KHR_surface` first, then the window's own extensions without duplicates.
fn merge_surface_extensions(surface_extensions: &[*const c_char]) -> Vec<*const c_char> {
    let mut extensions = Vec::with_capacity(surface_extensions.len() + 2);
    extensions.push(ash::khr::surface::NAME.as_ptr());
    for &ext in surface_extensions {
        // SAFETY: extension names are static, null-terminated strings.
        let name = unsafe { CStr::from_ptr(ext) };
        if name != ash::khr::surface::NAME {
            extensions.push(ext);
        }
    }
    extensions
}

fn validation_layer_installed(entry: &Entry) -> RhiResult<bool> {
    let layers = unsafe { entry.enumerate_instance_layer_properties()? };
    Ok(layers
        .iter()
        .any(|layer| layer.layer_name_as_c_str() == Ok(VALIDATION_LAYER)))
}

fn check_extensions_supported(entry: &Entry, wanted: &[*const c_char]) -> RhiResult<()> {
    let available = unsafe { entry.enumerate_instance_extension_properties(None)? };
    for &ext in wanted {
        let name = unsafe { CStr::from_ptr(ext) };
        let found = available
            .iter()
            .any(|props| props.extension_name_as_c_str() == Ok(name));
        if !found {
            return Err(RhiError::SurfaceError(format!(
                "instance extension {:?} is not supported",
                name
            )));
        }
        debug!("Instance extension: {:?}", name);
    }
    Ok(())
}

fn message_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        Level::ERROR
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        Level::WARN
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        Level::DEBUG
    } else {
        Level::TRACE
    }
}

fn message_kind(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

/// Debug messenger callback: routes layer messages into `tracing`.
///
/// # Safety
///
/// Called by the loader with either a null or a valid callback-data pointer.
unsafe extern "system" fn forward_validation_message(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let message = match unsafe { p_callback_data.as_ref() } {
        Some(data) if !data.p_message.is_null() => unsafe {
            CStr::from_ptr(data.p_message).to_string_lossy()
        },
        _ => Cow::Borrowed("(no message)"),
    };
    let kind = message_kind(message_type);

    match message_level(severity) {
        Level::ERROR => error!(target: "vulkan", kind, "{}", message),
        Level::WARN => warn!(target: "vulkan", kind, "{}", message),
        Level::DEBUG => debug!(target: "vulkan", kind, "{}", message),
        _ => trace!(target: "vulkan", kind, "{}", message),
    }

    // Never abort the call that triggered the message
    vk::FALSE
}
