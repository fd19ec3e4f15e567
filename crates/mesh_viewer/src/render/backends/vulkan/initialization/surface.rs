//! Presentation surface
//!
//! The windowing layer implements [`SurfaceProvider`]; the device context
//! wraps the created handle in a [`Surface`] that owns its destruction.

use std::sync::Arc;

use ash::extensions::khr;
use ash::vk;

use super::instance::Instance;
use crate::render::backends::vulkan::core::error::{VulkanError, VulkanResult};

/// Source of a presentation surface and its size
pub trait SurfaceProvider {
    /// Instance extensions the platform needs to create a surface
    fn required_instance_extensions(&self) -> VulkanResult<Vec<String>>;

    /// Create a surface for `instance`; the caller owns the result
    fn create_surface(&mut self, instance: vk::Instance) -> VulkanResult<vk::SurfaceKHR>;

    /// Current drawable size in pixels
    fn framebuffer_extent(&self) -> vk::Extent2D;
}

/// Vulkan surface wrapper for presentation
pub struct Surface {
    loader: khr::Surface,
    raw: vk::SurfaceKHR,
    // Destroyed after the surface
    instance: Arc<Instance>,
}

impl Surface {
    /// Create a surface through a provider
    pub fn new(instance: &Arc<Instance>, provider: &mut dyn SurfaceProvider) -> VulkanResult<Self> {
        let raw = provider.create_surface(instance.handle())?;
        log::info!("[surface] Created presentation surface");
        Ok(Self {
            loader: khr::Surface::new(instance.entry(), instance.raw()),
            raw,
            instance: Arc::clone(instance),
        })
    }

    /// Raw surface handle
    pub const fn handle(&self) -> vk::SurfaceKHR {
        self.raw
    }

    /// Surface extension loader
    pub const fn loader(&self) -> &khr::Surface {
        &self.loader
    }

    /// Whether `family` on `physical_device` can present here
    pub fn supports_family(&self, physical_device: vk::PhysicalDevice, family: u32) -> VulkanResult<bool> {
        unsafe { self.loader.get_physical_device_surface_support(physical_device, family, self.raw) }
            .map_err(|code| VulkanError::native("surface", code))
    }

    /// Surface capabilities for a physical device
    pub fn capabilities(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<vk::SurfaceCapabilitiesKHR> {
        unsafe { self.loader.get_physical_device_surface_capabilities(physical_device, self.raw) }
            .map_err(|code| VulkanError::native("surface", code))
    }

    /// Surface formats for a physical device
    pub fn formats(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe { self.loader.get_physical_device_surface_formats(physical_device, self.raw) }
            .map_err(|code| VulkanError::native("surface", code))
    }

    /// Present modes for a physical device
    pub fn present_modes(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<Vec<vk::PresentModeKHR>> {
        unsafe { self.loader.get_physical_device_surface_present_modes(physical_device, self.raw) }
            .map_err(|code| VulkanError::native("surface", code))
    }

    /// Instance the surface belongs to
    pub const fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Surface").field(&self.raw).finish()
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.raw, None) };
        log::debug!("[surface] Destroyed presentation surface");
    }
}
