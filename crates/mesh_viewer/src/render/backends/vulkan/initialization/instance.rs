//! Vulkan instance with optional validation and debug messenger

use std::ffi::{CStr, CString};
use std::fmt;
use std::sync::Arc;

use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry};

use super::extensions::{self, ExtensionRequest};
use crate::render::backends::vulkan::core::error::{VulkanError, VulkanResult};

const VALIDATION_LAYER: &CStr =
    // SAFETY: literal is NUL-terminated with no interior NUL
    unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

const ENGINE_NAME: &CStr =
    // SAFETY: literal is NUL-terminated with no interior NUL
    unsafe { CStr::from_bytes_with_nul_unchecked(b"mesh_viewer\0") };

/// Vulkan instance wrapper with RAII cleanup
///
/// Shared through `Arc`: the logical device and the surface each hold a
/// reference, so the instance is destroyed only after both.
pub struct Instance {
    entry: Entry,
    raw: ash::Instance,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    validation_enabled: bool,
}

impl Instance {
    /// Load the Vulkan library and create an instance
    ///
    /// `surface_extensions` are required (they come from the windowing
    /// system); validation and debug utils are enabled only when requested
    /// and installed.
    pub fn new(app_name: &str, surface_extensions: &[String], enable_validation: bool) -> VulkanResult<Arc<Self>> {
        // SAFETY: the loaded library outlives every handle through `entry`
        let entry = unsafe { Entry::load() }.map_err(|e| {
            log::error!("[instance] Failed to load the Vulkan library: {}", e);
            VulkanError::Loading(e.to_string())
        })?;

        let app_name = CString::new(app_name)
            .map_err(|_| VulkanError::validation("instance", "application name contains a NUL byte"))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let validation_enabled = enable_validation && Self::layer_available(&entry, VALIDATION_LAYER)?;
        if enable_validation && !validation_enabled {
            log::warn!("[instance] Validation requested but VK_LAYER_KHRONOS_validation is not installed");
        }

        let surface_names = surface_extensions
            .iter()
            .map(|name| CString::new(name.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| VulkanError::validation("instance", "extension name contains a NUL byte"))?;

        let mut requests: Vec<ExtensionRequest<'_>> =
            surface_names.iter().map(|name| ExtensionRequest::required(name)).collect();
        if validation_enabled {
            requests.push(ExtensionRequest::optional(DebugUtils::name()));
        }

        let available = entry
            .enumerate_instance_extension_properties(None)
            .map_err(|code| VulkanError::native("instance", code))?;
        let available_names: Vec<&CStr> = available.iter().map(extensions::property_name).collect();
        let negotiated = extensions::negotiate("instance", &available_names, &requests)?;
        let debug_enabled = negotiated.contains(&Some(DebugUtils::name()));
        let extension_ptrs = extensions::enabled_pointers(&negotiated);

        let layer_ptrs = if validation_enabled {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let raw = unsafe { entry.create_instance(&create_info, None) }
            .map_err(|code| VulkanError::native("instance", code))?;

        let debug = if debug_enabled {
            let utils = DebugUtils::new(&entry, &raw);
            match Self::create_messenger(&utils) {
                Ok(messenger) => Some((utils, messenger)),
                Err(e) => {
                    log::warn!("[instance] Debug messenger unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };

        log::info!(
            "[instance] Created Vulkan instance ({} extension(s), validation {})",
            extension_ptrs.len(),
            if validation_enabled { "on" } else { "off" }
        );

        Ok(Arc::new(Self {
            entry,
            raw,
            debug,
            validation_enabled,
        }))
    }

    fn layer_available(entry: &Entry, layer: &CStr) -> VulkanResult<bool> {
        let layers = entry
            .enumerate_instance_layer_properties()
            .map_err(|code| VulkanError::native("instance", code))?;
        Ok(layers.iter().any(|properties| {
            // SAFETY: the driver guarantees a NUL-terminated name
            unsafe { CStr::from_ptr(properties.layer_name.as_ptr()) == layer }
        }))
    }

    fn create_messenger(utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe { utils.create_debug_utils_messenger(&info, None) }
            .map_err(|code| VulkanError::native("instance", code))
    }

    /// Loader entry points
    pub const fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Instance function table
    pub const fn raw(&self) -> &ash::Instance {
        &self.raw
    }

    /// Raw instance handle
    pub fn handle(&self) -> vk::Instance {
        self.raw.handle()
    }

    /// Whether the validation layer is active
    pub const fn validation_enabled(&self) -> bool {
        self.validation_enabled
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("handle", &self.raw.handle())
            .field("validation_enabled", &self.validation_enabled)
            .finish_non_exhaustive()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some((utils, messenger)) = self.debug.take() {
                utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.raw.destroy_instance(None);
        }
        log::debug!("[instance] Destroyed Vulkan instance");
    }
}

/// Route validation messages into the `log` facade
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("[validation] {:?} - {}", message_type, message);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("[validation] {:?} - {}", message_type, message);
    } else {
        log::debug!("[validation] {:?} - {}", message_type, message);
    }

    vk::FALSE
}
