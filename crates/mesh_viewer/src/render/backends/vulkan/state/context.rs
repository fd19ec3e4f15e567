//! Device context: root of the Vulkan ownership graph
//!
//! One [`DeviceContext`] owns the instance, the selected physical device, the
//! logical device, the optional surface and the swapchain, and drives them
//! through a fixed sequence of states. Calls made out of order are rejected
//! with a local validation error. The application owns the context; there is
//! no global instance.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use ash::prelude::VkResult;
use ash::vk;

use super::protocol::{self, Recreation, SwapchainHost};
use super::registry::{self, DeviceResource, LifecycleRegistry, SwapchainResource};
use super::swapchain::{choose_extent, Swapchain, SwapchainParams, SwapchainState};
use crate::render::backends::vulkan::core::error::{VulkanError, VulkanResult};
use crate::render::backends::vulkan::initialization::device::{LogicalDevice, PhysicalDeviceInfo};
use crate::render::backends::vulkan::initialization::instance::Instance;
use crate::render::backends::vulkan::initialization::queue_family::{QueueFamilyIndices, QueueRoles};
use crate::render::backends::vulkan::initialization::surface::{Surface, SurfaceProvider};

/// Lifecycle position of a [`DeviceContext`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Nothing created
    Uninitialized,
    /// Instance exists
    InstanceCreated,
    /// Physical device chosen
    PhysicalDeviceSelected,
    /// Presentation surface attached
    SurfaceAttached,
    /// Logical device and queues exist
    DeviceCreated,
    /// First swapchain exists
    SwapchainCreated,
    /// Swapchain has been rebuilt at least once
    SwapchainRecreated,
    /// Everything released
    Terminated,
}

/// Owner of the instance, device, surface and swapchain
pub struct DeviceContext {
    state: ContextState,
    roles: QueueRoles,
    requested_extent: vk::Extent2D,
    recreate_pending: bool,
    swapchain_resources: LifecycleRegistry<dyn SwapchainResource>,
    device_resources: LifecycleRegistry<dyn DeviceResource>,
    swapchain: Option<Swapchain>,
    device: Option<Arc<LogicalDevice>>,
    physical: Option<PhysicalDeviceInfo>,
    surface: Option<Surface>,
    instance: Option<Arc<Instance>>,
}

impl DeviceContext {
    /// Context in the `Uninitialized` state
    pub const fn new() -> Self {
        Self {
            state: ContextState::Uninitialized,
            roles: QueueRoles::empty(),
            requested_extent: vk::Extent2D { width: 0, height: 0 },
            recreate_pending: false,
            swapchain_resources: LifecycleRegistry::new(),
            device_resources: LifecycleRegistry::new(),
            swapchain: None,
            device: None,
            physical: None,
            surface: None,
            instance: None,
        }
    }

    fn require_state(&self, operation: &str, allowed: &[ContextState]) -> VulkanResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(VulkanError::validation(
                "deviceContext",
                format!("{} is not valid in state {:?}", operation, self.state),
            ))
        }
    }

    fn instance_ref(&self) -> VulkanResult<&Arc<Instance>> {
        self.instance
            .as_ref()
            .ok_or_else(|| VulkanError::validation("deviceContext", "no instance"))
    }

    /// Create the instance
    ///
    /// `surface_extensions` come from the windowing system and are required;
    /// headless contexts pass none.
    pub fn create_instance(
        &mut self,
        app_name: &str,
        surface_extensions: &[String],
        enable_validation: bool,
    ) -> VulkanResult<()> {
        self.require_state("create_instance", &[ContextState::Uninitialized])?;
        self.instance = Some(Instance::new(app_name, surface_extensions, enable_validation)?);
        self.state = ContextState::InstanceCreated;
        Ok(())
    }

    /// Choose a physical device that can serve `roles`
    ///
    /// Presentation is checked again against the surface when the device is
    /// created.
    pub fn select_physical_device(&mut self, roles: QueueRoles) -> VulkanResult<()> {
        self.require_state("select_physical_device", &[ContextState::InstanceCreated])?;
        let physical = PhysicalDeviceInfo::select(self.instance_ref()?, None, roles)?;
        self.roles = roles;
        self.physical = Some(physical);
        self.state = ContextState::PhysicalDeviceSelected;
        Ok(())
    }

    /// Create the presentation surface; skipped for headless contexts
    pub fn attach_surface(&mut self, provider: &mut dyn SurfaceProvider) -> VulkanResult<()> {
        self.require_state("attach_surface", &[ContextState::PhysicalDeviceSelected])?;
        let surface = Surface::new(self.instance_ref()?, provider)?;
        self.requested_extent = provider.framebuffer_extent();
        self.surface = Some(surface);
        self.state = ContextState::SurfaceAttached;
        Ok(())
    }

    /// Create the logical device and its queues
    ///
    /// On failure the state and the selected physical device are unchanged,
    /// so the call can be retried.
    pub fn create_device(&mut self) -> VulkanResult<()> {
        self.require_state(
            "create_device",
            &[ContextState::PhysicalDeviceSelected, ContextState::SurfaceAttached],
        )?;
        let instance = Arc::clone(self.instance_ref()?);
        let selected = self
            .physical
            .as_ref()
            .ok_or_else(|| VulkanError::validation("deviceContext", "no physical device selected"))?;

        // Presentation support is only known once a surface is attached
        let physical = match &self.surface {
            Some(surface) => PhysicalDeviceInfo::evaluate(&instance, selected.raw, Some(surface), self.roles)?,
            None => selected.clone(),
        };

        let device = LogicalDevice::new(&instance, physical.clone(), self.surface.is_some())?;
        if let Err(e) = self
            .device_resources
            .for_each_forward(|resource| resource.on_device_created(&device))
        {
            self.device_resources
                .for_each_reverse(|resource| resource.on_device_destroyed());
            return Err(e);
        }

        self.physical = Some(physical);
        self.device = Some(device);
        self.state = ContextState::DeviceCreated;
        Ok(())
    }

    /// Create the first swapchain and notify registered dependents
    ///
    /// A dependent that fails to build leaves the context in
    /// [`ContextState::DeviceCreated`] with no swapchain.
    pub fn create_swapchain(&mut self, uncapped_framerate: bool) -> VulkanResult<()> {
        self.require_state("create_swapchain", &[ContextState::DeviceCreated])?;
        let device = Arc::clone(self.device()?);
        let physical = device.physical().raw;
        let surface = self
            .surface
            .as_ref()
            .ok_or_else(|| VulkanError::validation("deviceContext", "swapchain needs an attached surface"))?;

        let caps = surface.capabilities(physical)?;
        let formats = surface.formats(physical)?;
        let present_modes = surface.present_modes(physical)?;
        let params = SwapchainParams::choose(&caps, &formats, &present_modes, self.requested_extent, uncapped_framerate)?;

        let swapchain = Swapchain::new(&device, surface, params)?;
        let state = swapchain.state();
        self.swapchain = Some(swapchain);
        if let Err(e) = registry::notify_swapchain_created(&mut self.swapchain_resources, &state) {
            registry::notify_swapchain_destroyed(&mut self.swapchain_resources);
            self.swapchain = None;
            return Err(e);
        }

        self.state = ContextState::SwapchainCreated;
        Ok(())
    }

    /// Register a swapchain-dependent resource
    ///
    /// If a swapchain already exists the create callback runs immediately.
    pub fn register_swapchain_resource(&mut self, resource: &Rc<RefCell<dyn SwapchainResource>>) -> VulkanResult<()> {
        self.swapchain_resources.register(resource);
        match &self.swapchain {
            Some(swapchain) => resource.borrow_mut().on_swapchain_created(&swapchain.state()),
            None => Ok(()),
        }
    }

    /// Register a device-dependent resource
    ///
    /// If the device already exists the create callback runs immediately.
    pub fn register_device_resource(&mut self, resource: &Rc<RefCell<dyn DeviceResource>>) -> VulkanResult<()> {
        self.device_resources.register(resource);
        match &self.device {
            Some(device) => resource.borrow_mut().on_device_created(device),
            None => Ok(()),
        }
    }

    fn require_swapchain(&self, operation: &str) -> VulkanResult<()> {
        self.require_state(
            operation,
            &[ContextState::SwapchainCreated, ContextState::SwapchainRecreated],
        )
    }

    /// Run the recreation protocol now
    pub fn recreate_swapchain(&mut self) -> VulkanResult<Recreation> {
        self.require_swapchain("recreate_swapchain")?;
        protocol::recreate(self)
    }

    /// Acquire the next image; `None` means skip this frame
    pub fn acquire_next_image(&mut self, semaphore: vk::Semaphore) -> VulkanResult<Option<u32>> {
        self.require_swapchain("acquire_next_image")?;
        protocol::acquire(self, semaphore)
    }

    /// Present an image after `wait` semaphores
    pub fn present(&mut self, wait: &[vk::Semaphore], index: u32) -> VulkanResult<()> {
        self.require_swapchain("present")?;
        protocol::present(self, wait, index)
    }

    /// Record a new drawable size and schedule a recreation
    pub fn notify_resized(&mut self, extent: vk::Extent2D) {
        self.requested_extent = extent;
        self.recreate_pending = true;
    }

    /// Release everything in dependency order; safe to call repeatedly
    pub fn terminate(&mut self) {
        if self.state == ContextState::Terminated {
            return;
        }
        if let Some(device) = &self.device {
            if let Err(e) = device.wait_idle() {
                log::warn!("[deviceContext] Wait idle during terminate failed: {}", e);
            }
        }

        if self.swapchain.is_some() {
            registry::notify_swapchain_destroyed(&mut self.swapchain_resources);
        }
        self.swapchain = None;

        if self.device.is_some() {
            self.device_resources
                .for_each_reverse(|resource| resource.on_device_destroyed());
        }
        self.device = None;
        self.physical = None;
        self.surface = None;
        self.instance = None;
        self.swapchain_resources.clear();
        self.device_resources.clear();

        if self.state != ContextState::Uninitialized {
            log::info!("[deviceContext] Terminated");
        }
        self.state = ContextState::Terminated;
    }

    /// Current lifecycle state
    pub const fn state(&self) -> ContextState {
        self.state
    }

    /// Logical device
    pub fn device(&self) -> VulkanResult<&Arc<LogicalDevice>> {
        self.device
            .as_ref()
            .ok_or_else(|| VulkanError::validation("deviceContext", "no logical device"))
    }

    /// Selected physical device
    pub const fn physical_device(&self) -> Option<&PhysicalDeviceInfo> {
        self.physical.as_ref()
    }

    /// Queue families of the selected device
    pub fn queue_families(&self) -> Option<QueueFamilyIndices> {
        self.physical.as_ref().map(|physical| physical.queue_families)
    }

    /// Current swapchain
    pub fn swapchain(&self) -> VulkanResult<&Swapchain> {
        self.swapchain
            .as_ref()
            .ok_or_else(|| VulkanError::validation("deviceContext", "no swapchain"))
    }

    /// Snapshot of the current swapchain
    pub fn swapchain_state(&self) -> Option<SwapchainState> {
        self.swapchain.as_ref().map(Swapchain::state)
    }

    /// Number of swapchain images (0 without a swapchain)
    pub fn image_count(&self) -> usize {
        self.swapchain.as_ref().map_or(0, Swapchain::image_count)
    }

    /// Number of swapchain image views (0 without a swapchain)
    pub fn view_count(&self) -> usize {
        self.swapchain.as_ref().map_or(0, Swapchain::view_count)
    }

    /// Whether a recreation is scheduled
    pub const fn is_recreate_pending(&self) -> bool {
        self.recreate_pending
    }
}

impl Default for DeviceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceContext")
            .field("state", &self.state)
            .field("physical", &self.physical)
            .field("swapchain", &self.swapchain)
            .finish_non_exhaustive()
    }
}

impl SwapchainHost for DeviceContext {
    fn wait_queues_idle(&mut self) -> VulkanResult<()> {
        let device = self.device()?;
        let graphics = device.graphics_queue()?;
        device.queue_wait_idle(graphics)?;
        let present = device.present_queue()?;
        if present != graphics {
            device.queue_wait_idle(present)?;
        }
        Ok(())
    }

    fn current_extent(&mut self) -> VulkanResult<vk::Extent2D> {
        let physical = self.device()?.physical().raw;
        let surface = self
            .surface
            .as_ref()
            .ok_or_else(|| VulkanError::validation("deviceContext", "no surface"))?;
        let caps = surface.capabilities(physical)?;
        Ok(choose_extent(&caps, self.requested_extent))
    }

    fn notify_destroyed(&mut self) {
        registry::notify_swapchain_destroyed(&mut self.swapchain_resources);
    }

    fn release_views(&mut self) {
        if let Some(swapchain) = &mut self.swapchain {
            swapchain.release_views();
        }
    }

    fn rebuild(&mut self, extent: vk::Extent2D) -> VulkanResult<()> {
        let (Some(surface), Some(swapchain), Some(device)) = (&self.surface, &mut self.swapchain, &self.device) else {
            return Err(VulkanError::validation("deviceContext", "rebuild without a swapchain"));
        };
        let caps = surface.capabilities(device.physical().raw)?;
        let params = swapchain.params().patched(&caps, extent);
        swapchain.rebuild(surface, params)?;
        self.state = ContextState::SwapchainRecreated;
        Ok(())
    }

    fn notify_created(&mut self) -> VulkanResult<()> {
        let state = self.swapchain()?.state();
        registry::notify_swapchain_created(&mut self.swapchain_resources, &state)
    }

    fn acquire_raw(&mut self, semaphore: vk::Semaphore) -> VkResult<(u32, bool)> {
        let swapchain = self.swapchain.as_ref().ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)?;
        swapchain.acquire_next_image(semaphore, u64::MAX)
    }

    fn present_raw(&mut self, wait: &[vk::Semaphore], index: u32) -> VkResult<bool> {
        let (Some(swapchain), Some(device)) = (&self.swapchain, &self.device) else {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        };
        let queue = device
            .present_queue()
            .map_err(|_| vk::Result::ERROR_INITIALIZATION_FAILED)?;
        swapchain.queue_present(queue, wait, index)
    }

    fn destroy_retired(&mut self) {
        if let Some(swapchain) = &mut self.swapchain {
            swapchain.destroy_retired();
        }
    }

    fn recreate_pending(&self) -> bool {
        self.recreate_pending
    }

    fn set_recreate_pending(&mut self, pending: bool) {
        self.recreate_pending = pending;
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_order_operations_are_rejected() {
        let mut context = DeviceContext::new();

        assert!(matches!(context.create_device(), Err(VulkanError::Validation { .. })));
        assert!(matches!(context.create_swapchain(false), Err(VulkanError::Validation { .. })));
        assert!(context.select_physical_device(QueueRoles::GRAPHICS).is_err());
        assert!(context.acquire_next_image(vk::Semaphore::null()).is_err());
        assert!(context.present(&[], 0).is_err());
        assert_eq!(context.state(), ContextState::Uninitialized);
    }

    #[test]
    fn test_terminate_without_resources() {
        crate::foundation::logging::init_for_tests();
        let mut context = DeviceContext::new();
        context.terminate();
        context.terminate();

        assert_eq!(context.state(), ContextState::Terminated);
        assert_eq!(context.image_count(), 0);
        assert_eq!(context.view_count(), 0);
        assert!(context.create_instance("viewer", &[], false).is_err());
    }

    #[test]
    fn test_resize_schedules_recreation() {
        let mut context = DeviceContext::new();
        assert!(!context.is_recreate_pending());

        context.notify_resized(vk::Extent2D { width: 640, height: 480 });
        assert!(context.is_recreate_pending());
    }
}
