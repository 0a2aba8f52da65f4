//! Presentation surface (swapchain) management.
//!
//! The [`Swapchain`] owns everything that is bound to the window surface:
//! - The VkSwapchainKHR and its presentable images
//! - One image view and one framebuffer per image
//! - The render pass every framebuffer is built against
//!
//! All platform calls go through the [`SwapchainBackend`] trait.
//! [`VulkanSwapchainBackend`] is the `ash` implementation used at runtime.
//!
//! # Lifecycle
//!
//! - [`Swapchain::create`] derives format, present mode, extent and image
//!   count and builds the image set. Calling it again while ready is a no-op.
//! - [`Swapchain::recreate`] idles the device, releases the per-image views
//!   and framebuffers, and builds a new chain with the old handle passed as
//!   `old_swapchain`. It idles again before returning.
//! - [`Swapchain::destroy`] tears everything down. It also runs on drop.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use frameloop_rhi::device::Device;
//! use frameloop_rhi::instance::Instance;
//! use frameloop_rhi::swapchain::{AcquireResult, Swapchain, SwapchainPreferences, VulkanSwapchainBackend};
//! use ash::vk;
//!
//! # fn example(instance: &Instance, device: Arc<Device>, surface: vk::SurfaceKHR,
//! #            image_acquired: vk::Semaphore, render_finished: vk::Semaphore)
//! #            -> Result<(), frameloop_rhi::RhiError> {
//! let backend = VulkanSwapchainBackend::new(instance, device);
//! let mut swapchain = Swapchain::new(backend, surface, SwapchainPreferences::default());
//! swapchain.create(1280, 720)?;
//!
//! if let AcquireResult::Ok(index) = swapchain.acquire_next(image_acquired)? {
//!     // ... record and submit work that renders to swapchain.render_target(index) ...
//!     let _status = swapchain.present(index, render_finished)?;
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::QueueFamilyIndices;

/// Swapchain surface support details.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, etc.)
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the queries fail.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Returns true if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Preferred surface parameters. Selection falls back when they are unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainPreferences {
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
}

impl Default for SwapchainPreferences {
    fn default() -> Self {
        Self {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            present_mode: vk::PresentModeKHR::MAILBOX,
        }
    }
}

/// How usable the surface still is after an acquire or present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceStatus {
    Ok,
    /// Still presentable, but no longer matches the surface exactly.
    Suboptimal,
    /// Can no longer be presented to; must be recreated.
    OutOfDate,
}

impl SurfaceStatus {
    /// True for `Suboptimal` and `OutOfDate`.
    #[inline]
    pub fn needs_recreate(self) -> bool {
        !matches!(self, SurfaceStatus::Ok)
    }
}

/// Result of [`Swapchain::acquire_next`].
///
/// Errors not listed here are returned as `Err` and are fatal for the frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    /// The image at this index will be writable once the semaphore signals.
    Ok(u32),
    /// An image was acquired and the semaphore will signal, but the chain
    /// should be recreated.
    Suboptimal(u32),
    /// No image was acquired; the semaphore is untouched.
    OutOfDate,
}

impl AcquireResult {
    /// Returns the acquired image index, if any.
    pub fn image_index(self) -> Option<u32> {
        match self {
            AcquireResult::Ok(index) | AcquireResult::Suboptimal(index) => Some(index),
            AcquireResult::OutOfDate => None,
        }
    }

    pub fn status(self) -> SurfaceStatus {
        match self {
            AcquireResult::Ok(_) => SurfaceStatus::Ok,
            AcquireResult::Suboptimal(_) => SurfaceStatus::Suboptimal,
            AcquireResult::OutOfDate => SurfaceStatus::OutOfDate,
        }
    }
}

/// One image in the swapchain rotation with its render-target objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentableImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub framebuffer: vk::Framebuffer,
}

/// Everything a render stage needs to draw into an acquired image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub image_index: u32,
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub framebuffer: vk::Framebuffer,
    pub render_pass: vk::RenderPass,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
}

/// Platform calls made by [`Swapchain`].
///
/// Create infos are passed through untouched so implementations see exactly
/// what the selection logic decided.
pub trait SwapchainBackend {
    /// Queries capabilities, formats and present modes for `surface`.
    fn query_support(&self, surface: vk::SurfaceKHR) -> RhiResult<SwapchainSupportDetails>;

    /// Queue families that will render to and present the images.
    fn queue_families(&self) -> QueueFamilyIndices;

    fn create_swapchain(
        &self,
        create_info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> RhiResult<vk::SwapchainKHR>;

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RhiResult<Vec<vk::Image>>;

    fn create_image_view(
        &self,
        create_info: &vk::ImageViewCreateInfo<'_>,
    ) -> RhiResult<vk::ImageView>;

    fn destroy_image_view(&self, view: vk::ImageView);

    fn create_render_pass(
        &self,
        create_info: &vk::RenderPassCreateInfo<'_>,
    ) -> RhiResult<vk::RenderPass>;

    fn destroy_render_pass(&self, render_pass: vk::RenderPass);

    fn create_framebuffer(
        &self,
        create_info: &vk::FramebufferCreateInfo<'_>,
    ) -> RhiResult<vk::Framebuffer>;

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    /// Blocks until every queue is idle.
    fn wait_idle(&self) -> RhiResult<()>;

    /// Raw acquire. `Ok((index, suboptimal))` as in `vkAcquireNextImageKHR`.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> Result<(u32, bool), vk::Result>;

    /// Raw present. `Ok(true)` means suboptimal.
    fn queue_present(&self, present_info: &vk::PresentInfoKHR<'_>) -> Result<bool, vk::Result>;
}

/// [`SwapchainBackend`] implemented with `ash` against a real device.
pub struct VulkanSwapchainBackend {
    device: Arc<Device>,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
}

impl VulkanSwapchainBackend {
    pub fn new(instance: &Instance, device: Arc<Device>) -> Self {
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        Self {
            device,
            surface_loader,
            swapchain_loader,
        }
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl SwapchainBackend for VulkanSwapchainBackend {
    fn query_support(&self, surface: vk::SurfaceKHR) -> RhiResult<SwapchainSupportDetails> {
        SwapchainSupportDetails::query(self.device.physical_device(), surface, &self.surface_loader)
    }

    fn queue_families(&self) -> QueueFamilyIndices {
        self.device.queue_families()
    }

    fn create_swapchain(
        &self,
        create_info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> RhiResult<vk::SwapchainKHR> {
        Ok(unsafe { self.swapchain_loader.create_swapchain(create_info, None)? })
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RhiResult<Vec<vk::Image>> {
        Ok(unsafe { self.swapchain_loader.get_swapchain_images(swapchain)? })
    }

    fn create_image_view(
        &self,
        create_info: &vk::ImageViewCreateInfo<'_>,
    ) -> RhiResult<vk::ImageView> {
        Ok(unsafe { self.device.handle().create_image_view(create_info, None)? })
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.handle().destroy_image_view(view, None) }
    }

    fn create_render_pass(
        &self,
        create_info: &vk::RenderPassCreateInfo<'_>,
    ) -> RhiResult<vk::RenderPass> {
        Ok(unsafe { self.device.handle().create_render_pass(create_info, None)? })
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.handle().destroy_render_pass(render_pass, None) }
    }

    fn create_framebuffer(
        &self,
        create_info: &vk::FramebufferCreateInfo<'_>,
    ) -> RhiResult<vk::Framebuffer> {
        Ok(unsafe { self.device.handle().create_framebuffer(create_info, None)? })
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.handle().destroy_framebuffer(framebuffer, None) }
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.device.wait_idle()
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, u64::MAX, signal, vk::Fence::null())
        }
    }

    fn queue_present(&self, present_info: &vk::PresentInfoKHR<'_>) -> Result<bool, vk::Result> {
        unsafe {
            self.swapchain_loader
                .queue_present(self.device.present_queue(), present_info)
        }
    }
}

/// The presentation surface manager.
///
/// # Thread Safety
///
/// Owned and driven by the render thread only.
pub struct Swapchain<B: SwapchainBackend> {
    backend: B,
    surface: vk::SurfaceKHR,
    preferences: SwapchainPreferences,
    swapchain: vk::SwapchainKHR,
    images: Vec<PresentableImage>,
    render_pass: vk::RenderPass,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    ready: bool,
}

impl<B: SwapchainBackend> Swapchain<B> {
    /// Wraps `surface`. Nothing is created until [`create`](Self::create).
    pub fn new(backend: B, surface: vk::SurfaceKHR, preferences: SwapchainPreferences) -> Self {
        Self {
            backend,
            surface,
            preferences,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            render_pass: vk::RenderPass::null(),
            surface_format: vk::SurfaceFormatKHR::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D::default(),
            ready: false,
        }
    }

    /// Creates the swapchain, its images and the render pass.
    ///
    /// `width` and `height` are only used when the surface does not dictate
    /// its own extent. A second call while ready returns `Ok` without
    /// touching anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface has no formats or present modes, the
    /// resulting extent is zero, or any Vulkan object fails to create. Partial
    /// results are released before returning.
    pub fn create(&mut self, width: u32, height: u32) -> RhiResult<()> {
        if self.ready {
            debug!("Swapchain already created, skipping");
            return Ok(());
        }

        if let Err(e) = self.build(width, height, vk::SwapchainKHR::null()) {
            self.teardown();
            return Err(e);
        }
        Ok(())
    }

    /// Rebuilds the chain for the current surface state.
    ///
    /// Drains the device, releases views and framebuffers, then creates a new
    /// swapchain with the old one chained in. The render pass survives unless
    /// the selected format changed. On a manager that is not ready this is
    /// [`create`](Self::create).
    ///
    /// # Errors
    ///
    /// Returns an error if idling or creation fails. The old chain is retired
    /// either way, and after a failed build the manager is left not ready.
    pub fn recreate(&mut self, width: u32, height: u32) -> RhiResult<()> {
        if !self.ready {
            return self.create(width, height);
        }

        self.backend.wait_idle()?;

        info!("Recreating swapchain for size hint {}x{}", width, height);

        self.release_images();

        let old_swapchain = std::mem::replace(&mut self.swapchain, vk::SwapchainKHR::null());
        let result = self.build(width, height, old_swapchain);

        // Retired by the create call whether or not it succeeded
        self.backend.destroy_swapchain(old_swapchain);

        if let Err(e) = result {
            warn!("Swapchain recreation failed: {}", e);
            self.teardown();
            return Err(e);
        }

        self.backend.wait_idle()?;
        Ok(())
    }

    /// Destroys images, framebuffers, the render pass and the swapchain.
    ///
    /// No-op if not ready. The caller must ensure the device is idle.
    pub fn destroy(&mut self) {
        if !self.ready {
            return;
        }

        let (width, height, count) = (self.extent.width, self.extent.height, self.images.len());
        self.teardown();

        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            width, height, count
        );
    }

    /// Acquires the next presentable image, signaling `signal` when it is writable.
    ///
    /// A manager that is not ready reports `OutOfDate` so the caller recreates it.
    ///
    /// # Errors
    ///
    /// Any result other than success, suboptimal or out-of-date.
    pub fn acquire_next(&self, signal: vk::Semaphore) -> RhiResult<AcquireResult> {
        if !self.ready {
            debug!("Acquire on a swapchain that is not ready");
            return Ok(AcquireResult::OutOfDate);
        }

        match self.backend.acquire_next_image(self.swapchain, signal) {
            Ok((index, false)) => Ok(AcquireResult::Ok(index)),
            Ok((index, true)) => {
                debug!("Swapchain suboptimal during acquire");
                Ok(AcquireResult::Suboptimal(index))
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during acquire");
                Ok(AcquireResult::OutOfDate)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Queues image `image_index` for display once `wait` is signaled.
    ///
    /// # Errors
    ///
    /// Any result other than success, suboptimal or out-of-date, and an
    /// index that does not belong to the current chain.
    pub fn present(&self, image_index: u32, wait: vk::Semaphore) -> RhiResult<SurfaceStatus> {
        if !self.ready {
            return Ok(SurfaceStatus::OutOfDate);
        }
        if image_index as usize >= self.images.len() {
            return Err(RhiError::InvalidHandle(format!(
                "image index {} out of range for {} images",
                image_index,
                self.images.len()
            )));
        }

        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match self.backend.queue_present(&present_info) {
            Ok(false) => Ok(SurfaceStatus::Ok),
            Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => {
                debug!("Swapchain suboptimal during present");
                Ok(SurfaceStatus::Suboptimal)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during present");
                Ok(SurfaceStatus::OutOfDate)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Builds a chain into `self`. On error, whatever was created is left in
    /// `self` for [`teardown`](Self::teardown).
    fn build(&mut self, width: u32, height: u32, old_swapchain: vk::SwapchainKHR) -> RhiResult<()> {
        let support = self.backend.query_support(self.surface)?;

        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats, &self.preferences);
        let present_mode = choose_present_mode(&support.present_modes, self.preferences.present_mode);
        let extent = choose_extent(&support.capabilities, width, height);
        let image_count = determine_image_count(&support.capabilities);

        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::SwapchainError(format!(
                "Surface extent is {}x{}",
                extent.width, extent.height
            )));
        }

        info!(
            "Creating swapchain: {}x{}, format {:?}, color space {:?}, present mode {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            surface_format.color_space,
            present_mode,
            image_count
        );

        let queue_families = self.backend.queue_families();
        let family_indices = queue_families.unique_families();

        let (sharing_mode, queue_family_indices) = if queue_families.is_split() {
            debug!(
                "Using CONCURRENT sharing mode between queue families {:?}",
                family_indices
            );
            (vk::SharingMode::CONCURRENT, family_indices.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(queue_family_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        self.swapchain = self.backend.create_swapchain(&create_info)?;

        let images = self.backend.swapchain_images(self.swapchain)?;
        if images.len() != image_count as usize {
            info!(
                "Platform provided {} swapchain images ({} requested)",
                images.len(),
                image_count
            );
        }

        let format_changed = self.surface_format.format != surface_format.format;
        if self.render_pass == vk::RenderPass::null() || format_changed {
            if self.render_pass != vk::RenderPass::null() {
                debug!(
                    "Surface format changed from {:?} to {:?}, rebuilding render pass",
                    self.surface_format.format, surface_format.format
                );
                self.backend.destroy_render_pass(self.render_pass);
                self.render_pass = vk::RenderPass::null();
            }
            self.render_pass = create_render_pass(&self.backend, surface_format.format)?;
        }

        self.surface_format = surface_format;
        self.present_mode = present_mode;
        self.extent = extent;

        for (i, &image) in images.iter().enumerate() {
            let view = create_image_view(&self.backend, image, surface_format.format).map_err(|e| {
                RhiError::SwapchainError(format!("Failed to create image view {}: {}", i, e))
            })?;

            let attachments = [view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = match self.backend.create_framebuffer(&framebuffer_info) {
                Ok(framebuffer) => framebuffer,
                Err(e) => {
                    self.backend.destroy_image_view(view);
                    return Err(RhiError::SwapchainError(format!(
                        "Failed to create framebuffer {}: {}",
                        i, e
                    )));
                }
            };

            self.images.push(PresentableImage {
                image,
                view,
                framebuffer,
            });
        }

        debug!("Created {} image views and framebuffers", self.images.len());

        self.ready = true;
        info!("Swapchain created with {} images", self.images.len());
        Ok(())
    }

    /// Destroys framebuffers and views. Images belong to the swapchain.
    fn release_images(&mut self) {
        for image in self.images.drain(..) {
            self.backend.destroy_framebuffer(image.framebuffer);
            self.backend.destroy_image_view(image.view);
        }
    }

    /// Releases every object regardless of `ready`.
    fn teardown(&mut self) {
        self.release_images();

        if self.render_pass != vk::RenderPass::null() {
            self.backend.destroy_render_pass(self.render_pass);
            self.render_pass = vk::RenderPass::null();
        }

        if self.swapchain != vk::SwapchainKHR::null() {
            self.backend.destroy_swapchain(self.swapchain);
            self.swapchain = vk::SwapchainKHR::null();
        }

        self.surface_format = vk::SurfaceFormatKHR::default();
        self.ready = false;
    }

    /// Returns true between a successful create and the next destroy.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Returns the swapchain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the swapchain image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    /// Returns the swapchain color space.
    #[inline]
    pub fn color_space(&self) -> vk::ColorSpaceKHR {
        self.surface_format.color_space
    }

    /// Returns the swapchain extent (resolution).
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the present mode.
    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Returns the number of presentable images (0 when not ready).
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Returns the render pass all framebuffers are compatible with.
    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Returns all presentable images.
    #[inline]
    pub fn images(&self) -> &[PresentableImage] {
        &self.images
    }

    /// Returns the render target for an acquired image index.
    pub fn render_target(&self, image_index: u32) -> Option<RenderTarget> {
        self.images
            .get(image_index as usize)
            .map(|image| RenderTarget {
                image_index,
                image: image.image,
                view: image.view,
                framebuffer: image.framebuffer,
                render_pass: self.render_pass,
                extent: self.extent,
                format: self.surface_format.format,
            })
    }
}

impl<B: SwapchainBackend> Drop for Swapchain<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Chooses the surface format.
///
/// Returns the preferred format/color-space pair when offered, else the
/// first available format. A lone `UNDEFINED` entry means any format is
/// accepted.
fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    preferences: &SwapchainPreferences,
) -> vk::SurfaceFormatKHR {
    let preferred = vk::SurfaceFormatKHR {
        format: preferences.format,
        color_space: preferences.color_space,
    };

    if let [only] = formats
        && only.format == vk::Format::UNDEFINED
    {
        debug!("Surface accepts any format, using {:?}", preferred.format);
        return preferred;
    }

    if formats
        .iter()
        .any(|f| f.format == preferred.format && f.color_space == preferred.color_space)
    {
        debug!(
            "Selected preferred surface format: {:?} with {:?}",
            preferred.format, preferred.color_space
        );
        return preferred;
    }

    let fallback = formats[0];
    warn!(
        "Preferred surface format {:?} unavailable, using {:?}",
        preferred.format, fallback.format
    );
    fallback
}

/// Chooses the present mode.
///
/// Returns `preferred` when supported, else FIFO (always available).
fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if present_modes.contains(&preferred) {
        debug!("Selected {:?} present mode", preferred);
        return preferred;
    }

    debug!("{:?} unavailable, selected FIFO present mode (vsync)", preferred);
    vk::PresentModeKHR::FIFO
}

/// Chooses the swapchain extent (resolution).
///
/// If the current extent is not set (width/height are u32::MAX),
/// clamps the requested size to the surface's min/max extents. An inverted
/// range from a misbehaving driver resolves to the maximum.
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        debug!(
            "Using current surface extent: {}x{}",
            capabilities.current_extent.width, capabilities.current_extent.height
        );
        return capabilities.current_extent;
    }

    let extent = vk::Extent2D {
        width: width
            .max(capabilities.min_image_extent.width)
            .min(capabilities.max_image_extent.width),
        height: height
            .max(capabilities.min_image_extent.height)
            .min(capabilities.max_image_extent.height),
    };

    debug!(
        "Calculated extent: {}x{} (requested: {}x{}, min: {}x{}, max: {}x{})",
        extent.width,
        extent.height,
        width,
        height,
        capabilities.min_image_extent.width,
        capabilities.min_image_extent.height,
        capabilities.max_image_extent.width,
        capabilities.max_image_extent.height
    );

    extent
}

/// Determines the number of swapchain images to request.
///
/// One more than the minimum, clamped to the maximum when one is set.
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count.saturating_add(1);

    // max_image_count of 0 means no limit
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

fn create_image_view<B: SwapchainBackend>(
    backend: &B,
    image: vk::Image,
    format: vk::Format,
) -> RhiResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );

    backend.create_image_view(&create_info)
}

/// Single-subpass render pass with one color attachment that ends in
/// `PRESENT_SRC_KHR`.
fn create_render_pass<B: SwapchainBackend>(
    backend: &B,
    format: vk::Format,
) -> RhiResult<vk::RenderPass> {
    let attachments = [vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)];

    let color_refs = [vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)];

    // The acquire semaphore is waited at COLOR_ATTACHMENT_OUTPUT, so the
    // layout transition has to wait there as well.
    let dependencies = [vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    let render_pass = backend.create_render_pass(&create_info)?;
    debug!("Created render pass for format {:?}", format);
    Ok(render_pass)
}
