//! Physical device selection and the logical device

use std::ffi::CStr;
use std::fmt;
use std::sync::Arc;

use ash::extensions::khr;
use ash::vk;

use super::extensions::{self, ExtensionRequest};
use super::instance::Instance;
use super::queue_family::{discover_queue_families, FamilyCaps, QueueFamilyIndices, QueueRoles};
use super::surface::Surface;
use crate::render::backends::vulkan::core::error::{VulkanError, VulkanResult};
use crate::render::backends::vulkan::resources::memory::find_memory_type;

/// Selected physical device with its cached properties
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub raw: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Queue families resolved for the requested roles
    pub queue_families: QueueFamilyIndices,
    /// Device name for diagnostics
    pub name: String,
}

impl PhysicalDeviceInfo {
    /// Pick a device that serves `roles`, preferring discrete GPUs
    ///
    /// With a surface, presentation support and the swapchain extension are
    /// also required. Zero enumerated devices is unrecoverable.
    pub fn select(instance: &Instance, surface: Option<&Surface>, roles: QueueRoles) -> VulkanResult<Self> {
        let devices = unsafe { instance.raw().enumerate_physical_devices() }
            .map_err(|code| VulkanError::native("physicalDevice", code))?;

        if devices.is_empty() {
            return Err(VulkanError::environment("no Vulkan physical devices available"));
        }

        let mut candidates = Vec::new();
        for device in devices {
            match Self::evaluate(instance, device, surface, roles) {
                Ok(info) => candidates.push(info),
                Err(e) => log::debug!("[physicalDevice] Skipping device: {}", e),
            }
        }

        let selected = candidates
            .iter()
            .position(|info| info.properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU)
            .or_else(|| (!candidates.is_empty()).then_some(0));

        match selected {
            Some(index) => {
                let info = candidates.swap_remove(index);
                log::info!("[physicalDevice] Selected GPU: {} ({:?})", info.name, info.properties.device_type);
                Ok(info)
            }
            None => Err(VulkanError::environment(format!(
                "no physical device supports the requested queue roles {roles:?}"
            ))),
        }
    }

    /// Inspect one device against the requested roles and optional surface
    pub fn evaluate(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: Option<&Surface>,
        roles: QueueRoles,
    ) -> VulkanResult<Self> {
        let raw_instance = instance.raw();
        let properties = unsafe { raw_instance.get_physical_device_properties(device) };
        let features = unsafe { raw_instance.get_physical_device_features(device) };
        let memory_properties = unsafe { raw_instance.get_physical_device_memory_properties(device) };
        let family_properties = unsafe { raw_instance.get_physical_device_queue_family_properties(device) };

        let mut table = Vec::with_capacity(family_properties.len());
        for (index, family) in family_properties.iter().enumerate() {
            let present = match surface {
                Some(surface) => surface.supports_family(device, index as u32)?,
                None => false,
            };
            table.push(FamilyCaps {
                flags: family.queue_flags,
                present,
            });
        }

        let roles = if surface.is_some() { roles } else { roles - QueueRoles::PRESENT };
        let queue_families = discover_queue_families(&table, roles)?;

        if surface.is_some() {
            let available = unsafe { raw_instance.enumerate_device_extension_properties(device) }
                .map_err(|code| VulkanError::native("physicalDevice", code))?;
            let names: Vec<&CStr> = available.iter().map(extensions::property_name).collect();
            extensions::negotiate("physicalDevice", &names, &[ExtensionRequest::required(khr::Swapchain::name())])?;
        }

        // SAFETY: the driver guarantees a NUL-terminated name
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        Ok(Self {
            raw: device,
            properties,
            memory_properties,
            features,
            queue_families,
            name,
        })
    }
}

impl fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.name)
            .field("device_type", &self.properties.device_type)
            .field("queue_families", &self.queue_families)
            .finish_non_exhaustive()
    }
}

/// Logical device wrapper with RAII cleanup
///
/// Every device-level handle wrapper holds an `Arc` to this, so the device
/// is destroyed only after its last child.
pub struct LogicalDevice {
    raw: ash::Device,
    physical: PhysicalDeviceInfo,
    graphics_queue: Option<vk::Queue>,
    present_queue: Option<vk::Queue>,
    compute_queue: Option<vk::Queue>,
    swapchain_loader: Option<khr::Swapchain>,
    // Destroyed after the device
    instance: Arc<Instance>,
}

impl LogicalDevice {
    /// Create the device with one queue per distinct family
    ///
    /// `with_swapchain` enables the swapchain extension for presentation.
    pub fn new(instance: &Arc<Instance>, physical: PhysicalDeviceInfo, with_swapchain: bool) -> VulkanResult<Arc<Self>> {
        let families = physical.queue_families;
        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique_families()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let mut requests = Vec::new();
        if with_swapchain {
            requests.push(ExtensionRequest::required(khr::Swapchain::name()));
        }
        let available = unsafe { instance.raw().enumerate_device_extension_properties(physical.raw) }
            .map_err(|code| VulkanError::native("device", code))?;
        let names: Vec<&CStr> = available.iter().map(extensions::property_name).collect();
        let negotiated = extensions::negotiate("device", &names, &requests)?;
        let extension_ptrs = extensions::enabled_pointers(&negotiated);

        let features = enabled_features();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&features);

        let raw = unsafe { instance.raw().create_device(physical.raw, &create_info, None) }
            .map_err(|code| VulkanError::native("device", code))?;

        let queue = |family: Option<u32>| family.map(|index| unsafe { raw.get_device_queue(index, 0) });
        let graphics_queue = queue(families.graphics);
        let present_queue = queue(families.present);
        let compute_queue = queue(families.compute);

        let swapchain_loader = with_swapchain.then(|| khr::Swapchain::new(instance.raw(), &raw));

        log::info!(
            "[device] Created logical device on {} with {} queue(s)",
            physical.name,
            queue_infos.len()
        );

        Ok(Arc::new(Self {
            raw,
            physical,
            graphics_queue,
            present_queue,
            compute_queue,
            swapchain_loader,
            instance: Arc::clone(instance),
        }))
    }

    /// Device function table
    pub const fn raw(&self) -> &ash::Device {
        &self.raw
    }

    /// Selected physical device
    pub const fn physical(&self) -> &PhysicalDeviceInfo {
        &self.physical
    }

    /// Instance the device was created from
    pub const fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    /// Memory heaps and types
    pub const fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.physical.memory_properties
    }

    /// Device limits
    pub const fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.physical.properties.limits
    }

    /// Queue family per role
    pub const fn queue_families(&self) -> QueueFamilyIndices {
        self.physical.queue_families
    }

    /// Graphics queue
    pub fn graphics_queue(&self) -> VulkanResult<vk::Queue> {
        self.graphics_queue
            .ok_or_else(|| VulkanError::validation("device", "no graphics queue on this device"))
    }

    /// Presentation queue
    pub fn present_queue(&self) -> VulkanResult<vk::Queue> {
        self.present_queue
            .ok_or_else(|| VulkanError::validation("device", "no presentation queue on this device"))
    }

    /// Compute queue
    pub fn compute_queue(&self) -> VulkanResult<vk::Queue> {
        self.compute_queue
            .ok_or_else(|| VulkanError::validation("device", "no compute queue on this device"))
    }

    /// Swapchain extension loader
    pub fn swapchain_loader(&self) -> VulkanResult<&khr::Swapchain> {
        self.swapchain_loader
            .as_ref()
            .ok_or_else(|| VulkanError::validation("device", "swapchain extension not enabled"))
    }

    /// Block until all queues are idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.raw.device_wait_idle() }.map_err(|code| VulkanError::native("device", code))
    }

    /// Block until one queue is idle
    pub fn queue_wait_idle(&self, queue: vk::Queue) -> VulkanResult<()> {
        unsafe { self.raw.queue_wait_idle(queue) }.map_err(|code| VulkanError::native("queue", code))
    }

    /// Memory type index for a resource's type bits and required properties
    pub fn find_memory_type(&self, type_bits: u32, properties: vk::MemoryPropertyFlags) -> VulkanResult<u32> {
        find_memory_type(self.memory_properties(), type_bits, properties)
            .ok_or(VulkanError::NoSuitableMemoryType(properties))
    }
}

/// Core features every logical device is created with
///
/// `fillModeNonSolid` is always on since the wireframe variant draws lines;
/// a device without it fails creation with `ERROR_FEATURE_NOT_PRESENT`.
pub fn enabled_features() -> vk::PhysicalDeviceFeatures {
    vk::PhysicalDeviceFeatures::builder().fill_mode_non_solid(true).build()
}

impl fmt::Debug for LogicalDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicalDevice")
            .field("handle", &self.raw.handle())
            .field("physical", &self.physical)
            .finish_non_exhaustive()
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(code) = self.raw.device_wait_idle() {
                log::warn!("[device] Wait idle before destroy failed: {:?}", code);
            }
            self.raw.destroy_device(None);
        }
        log::debug!("[device] Destroyed logical device");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_fill_mode_is_always_requested() {
        let features = enabled_features();
        assert_eq!(features.fill_mode_non_solid, vk::TRUE);
        assert_eq!(features.geometry_shader, vk::FALSE);
        assert_eq!(features.sampler_anisotropy, vk::FALSE);
    }
}
