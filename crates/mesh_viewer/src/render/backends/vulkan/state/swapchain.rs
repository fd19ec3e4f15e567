//! Swapchain parameters and the swapchain itself
//!
//! Parameter selection is split into pure functions over the surface's
//! reported capabilities so each rule can be checked without a GPU.

use std::sync::Arc;

use ash::vk;

use crate::render::backends::vulkan::core::error::{VulkanError, VulkanResult};
use crate::render::backends::vulkan::core::handle::ImageView;
use crate::render::backends::vulkan::initialization::device::LogicalDevice;
use crate::render::backends::vulkan::initialization::surface::Surface;

const PREFERRED_FORMATS: [vk::Format; 2] = [vk::Format::B8G8R8A8_UNORM, vk::Format::R8G8B8A8_UNORM];

/// One more image than the minimum, capped at the maximum when there is one
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        desired.min(caps.max_image_count)
    } else {
        desired
    }
}

/// Current extent, or `fallback` clamped to the supported range when the
/// platform leaves the extent to the application
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, fallback: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: fallback
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: fallback
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// Whether nothing can be drawn at this size (minimized window)
pub const fn is_zero_area(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

/// INHERIT when supported, else the lowest supported bit
pub fn choose_composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    if supported.contains(vk::CompositeAlphaFlagsKHR::INHERIT) {
        return vk::CompositeAlphaFlagsKHR::INHERIT;
    }
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|bit| supported.contains(*bit))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

/// Color attachment plus whichever transfer usages the surface allows
pub fn choose_usage(supported: vk::ImageUsageFlags) -> vk::ImageUsageFlags {
    let mut usage = vk::ImageUsageFlags::COLOR_ATTACHMENT;
    if supported.contains(vk::ImageUsageFlags::TRANSFER_SRC) {
        usage |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if supported.contains(vk::ImageUsageFlags::TRANSFER_DST) {
        usage |= vk::ImageUsageFlags::TRANSFER_DST;
    } else {
        log::warn!("[swapchain] Surface images do not support TRANSFER_DST");
    }
    usage
}

/// First preferred UNORM format in sRGB non-linear space, else the first one
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> VulkanResult<vk::SurfaceFormatKHR> {
    let Some(first) = formats.first() else {
        return Err(VulkanError::environment("surface reports no formats"));
    };
    let preferred = formats.iter().find(|format| {
        PREFERRED_FORMATS.contains(&format.format) && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });
    match preferred {
        Some(format) => Ok(*format),
        None => {
            log::warn!(
                "[swapchain] No preferred surface format available, using {:?}/{:?}",
                first.format,
                first.color_space
            );
            Ok(*first)
        }
    }
}

/// FIFO, unless an uncapped framerate is wanted and MAILBOX or IMMEDIATE exists
pub fn choose_present_mode(modes: &[vk::PresentModeKHR], uncapped: bool) -> VulkanResult<vk::PresentModeKHR> {
    if modes.is_empty() {
        return Err(VulkanError::environment("surface reports no present modes"));
    }
    if uncapped {
        for mode in [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE] {
            if modes.contains(&mode) {
                return Ok(mode);
            }
        }
    }
    Ok(vk::PresentModeKHR::FIFO)
}

/// Creation parameters retained for recreation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainParams {
    /// Image format and color space
    pub format: vk::SurfaceFormatKHR,
    /// Image size
    pub extent: vk::Extent2D,
    /// Presentation mode
    pub present_mode: vk::PresentModeKHR,
    /// Minimum number of images requested
    pub image_count: u32,
    /// Image usage
    pub usage: vk::ImageUsageFlags,
    /// Compositing mode
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    /// Transform applied before presentation
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainParams {
    /// Select every parameter from the surface's capabilities
    pub fn choose(
        caps: &vk::SurfaceCapabilitiesKHR,
        formats: &[vk::SurfaceFormatKHR],
        present_modes: &[vk::PresentModeKHR],
        fallback_extent: vk::Extent2D,
        uncapped: bool,
    ) -> VulkanResult<Self> {
        Ok(Self {
            format: choose_surface_format(formats)?,
            extent: choose_extent(caps, fallback_extent),
            present_mode: choose_present_mode(present_modes, uncapped)?,
            image_count: choose_image_count(caps),
            usage: choose_usage(caps.supported_usage_flags),
            composite_alpha: choose_composite_alpha(caps.supported_composite_alpha),
            pre_transform: caps.current_transform,
        })
    }

    /// Parameters for recreation: format, mode and usage are kept, size and
    /// transform follow the fresh capabilities
    pub fn patched(&self, caps: &vk::SurfaceCapabilitiesKHR, extent: vk::Extent2D) -> Self {
        Self {
            extent,
            image_count: choose_image_count(caps),
            pre_transform: caps.current_transform,
            ..*self
        }
    }
}

/// Snapshot handed to swapchain-dependent resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapchainState {
    /// Image format
    pub format: vk::Format,
    /// Image size
    pub extent: vk::Extent2D,
    /// Number of images
    pub image_count: u32,
    /// One view per image, in image order
    pub image_views: Vec<vk::ImageView>,
}

/// Swapchain with its images and views
///
/// The previous swapchain handle is kept as "retired" after recreation and
/// destroyed at the next successful acquire.
pub struct Swapchain {
    views: Vec<ImageView>,
    images: Vec<vk::Image>,
    raw: vk::SwapchainKHR,
    retired: vk::SwapchainKHR,
    params: SwapchainParams,
    device: Arc<LogicalDevice>,
}

impl Swapchain {
    /// Create a swapchain on `surface`
    pub fn new(device: &Arc<LogicalDevice>, surface: &Surface, params: SwapchainParams) -> VulkanResult<Self> {
        let raw = Self::create_raw(device, surface, &params, vk::SwapchainKHR::null())?;
        let mut swapchain = Self {
            views: Vec::new(),
            images: Vec::new(),
            raw,
            retired: vk::SwapchainKHR::null(),
            params,
            device: Arc::clone(device),
        };
        swapchain.fetch_images()?;
        log::info!(
            "[swapchain] Created {} images at {}x{} ({:?}, {:?})",
            swapchain.images.len(),
            params.extent.width,
            params.extent.height,
            params.format.format,
            params.present_mode
        );
        Ok(swapchain)
    }

    fn create_raw(
        device: &LogicalDevice,
        surface: &Surface,
        params: &SwapchainParams,
        old: vk::SwapchainKHR,
    ) -> VulkanResult<vk::SwapchainKHR> {
        // Exclusive even with split families; ownership moves by barrier
        let info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle())
            .min_image_count(params.image_count)
            .image_format(params.format.format)
            .image_color_space(params.format.color_space)
            .image_extent(params.extent)
            .image_array_layers(1)
            .image_usage(params.usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(params.pre_transform)
            .composite_alpha(params.composite_alpha)
            .present_mode(params.present_mode)
            .clipped(true)
            .old_swapchain(old);

        unsafe { device.swapchain_loader()?.create_swapchain(&info, None) }
            .map_err(|code| VulkanError::native("swapchain", code))
    }

    fn fetch_images(&mut self) -> VulkanResult<()> {
        let loader = self.device.swapchain_loader()?;
        let images = unsafe { loader.get_swapchain_images(self.raw) }
            .map_err(|code| VulkanError::native("swapchain", code))?;

        let mut views = Vec::with_capacity(images.len());
        for image in &images {
            views.push(ImageView::new_2d(
                &self.device,
                *image,
                self.params.format.format,
                vk::ImageAspectFlags::COLOR,
            )?);
        }
        self.images = images;
        self.views = views;
        Ok(())
    }

    /// Rebuild with new parameters, chaining through the current handle
    ///
    /// The current handle becomes the retired one; a handle retired earlier
    /// is destroyed first.
    pub fn rebuild(&mut self, surface: &Surface, params: SwapchainParams) -> VulkanResult<()> {
        self.release_views();
        self.destroy_retired();

        let raw = Self::create_raw(&self.device, surface, &params, self.raw)?;
        self.retired = std::mem::replace(&mut self.raw, raw);
        self.params = params;
        self.fetch_images()?;
        log::info!(
            "[swapchain] Recreated {} images at {}x{}",
            self.images.len(),
            params.extent.width,
            params.extent.height
        );
        Ok(())
    }

    /// Destroy the views and forget the images
    pub fn release_views(&mut self) {
        self.views.clear();
        self.images.clear();
    }

    /// Destroy the handle left over from the last recreation, if any
    pub fn destroy_retired(&mut self) {
        if self.retired == vk::SwapchainKHR::null() {
            return;
        }
        if let Ok(loader) = self.device.swapchain_loader() {
            unsafe { loader.destroy_swapchain(self.retired, None) };
            log::debug!("[swapchain] Destroyed retired swapchain");
        }
        self.retired = vk::SwapchainKHR::null();
    }

    /// Raw acquire; `Ok((index, suboptimal))`
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore, timeout_ns: u64) -> ash::prelude::VkResult<(u32, bool)> {
        let loader = self
            .device
            .swapchain_loader()
            .map_err(|_| vk::Result::ERROR_EXTENSION_NOT_PRESENT)?;
        unsafe { loader.acquire_next_image(self.raw, timeout_ns, semaphore, vk::Fence::null()) }
    }

    /// Raw present; `Ok(true)` means suboptimal
    pub fn queue_present(&self, queue: vk::Queue, wait: &[vk::Semaphore], index: u32) -> ash::prelude::VkResult<bool> {
        let loader = self
            .device
            .swapchain_loader()
            .map_err(|_| vk::Result::ERROR_EXTENSION_NOT_PRESENT)?;
        let swapchains = [self.raw];
        let indices = [index];
        let info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait)
            .swapchains(&swapchains)
            .image_indices(&indices);
        unsafe { loader.queue_present(queue, &info) }
    }

    /// Raw handle
    pub const fn handle(&self) -> vk::SwapchainKHR {
        self.raw
    }

    /// Current parameters
    pub const fn params(&self) -> &SwapchainParams {
        &self.params
    }

    /// Image size
    pub const fn extent(&self) -> vk::Extent2D {
        self.params.extent
    }

    /// Images in presentation-engine order
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// Number of images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Number of live views
    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    /// Snapshot for swapchain-dependent resources
    pub fn state(&self) -> SwapchainState {
        SwapchainState {
            format: self.params.format.format,
            extent: self.params.extent,
            image_count: self.images.len() as u32,
            image_views: self.views.iter().map(ImageView::handle).collect(),
        }
    }
}

impl std::fmt::Debug for Swapchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swapchain")
            .field("handle", &self.raw)
            .field("images", &self.images.len())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.release_views();
        self.destroy_retired();
        if let Ok(loader) = self.device.swapchain_loader() {
            unsafe { loader.destroy_swapchain(self.raw, None) };
        }
        log::debug!("[swapchain] Destroyed swapchain");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D { width: 800, height: 600 },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE | vk::CompositeAlphaFlagsKHR::INHERIT,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        }
    }

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    #[test]
    fn test_image_count() {
        let mut caps = caps();
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);

        caps.max_image_count = 0;
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn test_extent_sentinel_uses_clamped_fallback() {
        let mut caps = caps();
        assert_eq!(choose_extent(&caps, vk::Extent2D { width: 10, height: 10 }), caps.current_extent);

        caps.current_extent = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };
        let extent = choose_extent(&caps, vk::Extent2D { width: 9000, height: 0 });
        assert_eq!(extent, vk::Extent2D { width: 4096, height: 1 });
    }

    #[test]
    fn test_zero_area() {
        assert!(is_zero_area(vk::Extent2D { width: 0, height: 600 }));
        assert!(!is_zero_area(vk::Extent2D { width: 1, height: 1 }));
    }

    #[test]
    fn test_composite_alpha_and_usage() {
        assert_eq!(
            choose_composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE | vk::CompositeAlphaFlagsKHR::INHERIT),
            vk::CompositeAlphaFlagsKHR::INHERIT
        );
        assert_eq!(
            choose_composite_alpha(vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED | vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED),
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED
        );

        let usage = choose_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC);
        assert_eq!(usage, vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC);
    }

    #[test]
    fn test_surface_format_preference() {
        let srgb = vk::ColorSpaceKHR::SRGB_NONLINEAR;
        let formats = [
            format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            format(vk::Format::R8G8B8A8_UNORM, srgb),
        ];
        assert_eq!(choose_surface_format(&formats).unwrap(), formats[1]);

        let fallback = [format(vk::Format::B8G8R8A8_SRGB, srgb)];
        assert_eq!(choose_surface_format(&fallback).unwrap(), fallback[0]);

        let err = choose_surface_format(&[]).unwrap_err();
        assert!(err.is_unrecoverable());
    }

    #[test]
    fn test_present_mode() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&modes, false).unwrap(), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&modes, true).unwrap(), vk::PresentModeKHR::IMMEDIATE);

        let with_mailbox = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&with_mailbox, true).unwrap(), vk::PresentModeKHR::MAILBOX);

        assert!(choose_present_mode(&[], false).unwrap_err().is_unrecoverable());
    }

    #[test]
    fn test_patched_params_keep_format_and_mode() {
        let caps = caps();
        let formats = [format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        let params = SwapchainParams::choose(&caps, &formats, &[vk::PresentModeKHR::FIFO], caps.current_extent, false).unwrap();

        let resized = params.patched(&caps, vk::Extent2D { width: 1024, height: 768 });
        assert_eq!(resized.format, params.format);
        assert_eq!(resized.present_mode, params.present_mode);
        assert_eq!(resized.usage, params.usage);
        assert_eq!(resized.extent, vk::Extent2D { width: 1024, height: 768 });
    }
}
