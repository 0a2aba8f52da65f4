//! The host window and the Vulkan surface presented into it.

use std::ffi::{CStr, c_char};
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{DisplayHandle, HasDisplayHandle, HasWindowHandle, WindowHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes, WindowId};

use frameloop_core::config::WindowConfig;
use frameloop_core::{Error, FrameStats, Result};

/// Owned `VkSurfaceKHR`.
///
/// Drop it after every swapchain built on it and before the instance.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Surface loader, for capability, format and present mode queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: created against the loader's instance and destroyed only here.
        unsafe { self.surface_loader.destroy_surface(self.handle, None) };
        tracing::debug!("Vulkan surface destroyed");
    }
}

/// A winit window plus the handles needed to present into it.
pub struct Window {
    window: Arc<WinitWindow>,
    title: String,
}

impl Window {
    /// Creates a resizable window from `config`.
    pub fn new(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(config.title.as_str())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        tracing::info!("Window created: {}x{}", config.width, config.height);

        Ok(Self {
            window: Arc::new(window),
            title: config.title.clone(),
        })
    }

    #[inline]
    pub fn id(&self) -> WindowId {
        self.window.id()
    }

    /// Current drawable size in physical pixels. Zero while minimized on
    /// most platforms.
    pub fn size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    pub fn is_minimized(&self) -> bool {
        let (width, height) = self.size();
        width == 0 || height == 0 || self.window.is_minimized().unwrap_or(false)
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Shows frame timing after the configured title.
    pub fn show_stats(&self, stats: &FrameStats) {
        self.window.set_title(&stats_title(&self.title, stats));
    }

    fn handles(&self) -> Result<(DisplayHandle<'_>, WindowHandle<'_>)> {
        let display = self.window.display_handle();
        let window = self.window.window_handle();
        match (display, window) {
            (Ok(display), Ok(window)) => Ok((display, window)),
            (Err(e), _) | (_, Err(e)) => {
                Err(Error::Window(format!("window handle unavailable: {}", e)))
            }
        }
    }

    /// Instance extensions the platform needs before a surface can exist.
    pub fn required_extensions(&self) -> Result<Vec<*const c_char>> {
        let (display, _) = self.handles()?;
        let extensions = ash_window::enumerate_required_extensions(display.as_raw())
            .map_err(|e| Error::Surface(format!("no surface extensions for this display: {}", e)))?;
        // SAFETY: ash_window hands out static, null-terminated names.
        let names: Vec<_> = extensions
            .iter()
            .map(|&ext| unsafe { CStr::from_ptr(ext) })
            .collect();
        tracing::debug!(?names, "Surface extensions");

        Ok(extensions.to_vec())
    }

    /// Creates the presentation surface for this window.
    ///
    /// `instance` must have been created with [`Window::required_extensions`].
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let (display, window) = self.handles()?;

        // SAFETY: both handles belong to a live window; Surface::drop destroys
        // the result.
        let handle = unsafe {
            ash_window::create_surface(entry, instance, display.as_raw(), window.as_raw(), None)
        }
        .map_err(|e| Error::Surface(format!("vkCreate*SurfaceKHR failed: {}", e)))?;

        tracing::info!(?handle, "Vulkan surface created");

        Ok(Surface {
            handle,
            surface_loader: ash::khr::surface::Instance::new(entry, instance),
        })
    }
}

/// Title text with the averaged frame rate and last frame time.
pub fn stats_title(title: &str, stats: &FrameStats) -> String {
    format!(
        "{} | {:.0} fps | {:.2} ms",
        title,
        stats.fps,
        stats.frame_time_ms()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_stats_title() {
        let stats = FrameStats {
            delta: Duration::from_micros(16_667),
            instantaneous_fps: 60.0,
            fps: 59.6,
            frame_count: 120,
        };
        assert_eq!(stats_title("frameloop", &stats), "frameloop | 60 fps | 16.67 ms");
    }
}
