//! Instance and device extension negotiation

use std::ffi::CStr;

use ash::vk;

use crate::render::backends::vulkan::core::error::{VulkanError, VulkanResult};

/// One extension the caller would like enabled
#[derive(Debug, Clone, Copy)]
pub struct ExtensionRequest<'a> {
    /// Extension name
    pub name: &'a CStr,
    /// Whether creation must fail without it
    pub required: bool,
}

impl<'a> ExtensionRequest<'a> {
    /// Extension that must be present
    pub const fn required(name: &'a CStr) -> Self {
        Self { name, required: true }
    }

    /// Extension used only when present
    pub const fn optional(name: &'a CStr) -> Self {
        Self { name, required: false }
    }
}

/// Match requests against the available extensions
///
/// The result has one entry per request, in request order: `Some(name)` if
/// the extension will be enabled, `None` for a missing optional one. A
/// missing required extension fails the whole negotiation.
pub fn negotiate<'a>(
    kind: &'static str,
    available: &[&CStr],
    requested: &[ExtensionRequest<'a>],
) -> VulkanResult<Vec<Option<&'a CStr>>> {
    let mut missing_required = Vec::new();
    let mut enabled = Vec::with_capacity(requested.len());

    for request in requested {
        if available.contains(&request.name) {
            enabled.push(Some(request.name));
        } else if request.required {
            missing_required.push(request.name.to_string_lossy().into_owned());
            enabled.push(None);
        } else {
            log::warn!(
                "[{}] Optional extension {} not available, continuing without it",
                kind,
                request.name.to_string_lossy()
            );
            enabled.push(None);
        }
    }

    if missing_required.is_empty() {
        Ok(enabled)
    } else {
        Err(VulkanError::validation(
            kind,
            format!("required extension(s) not available: {}", missing_required.join(", ")),
        ))
    }
}

/// Names of enabled extensions as pointers for a create-info
pub fn enabled_pointers(negotiated: &[Option<&CStr>]) -> Vec<*const std::os::raw::c_char> {
    negotiated.iter().flatten().map(|name| name.as_ptr()).collect()
}

/// Extension name out of a properties record
pub fn property_name(properties: &vk::ExtensionProperties) -> &CStr {
    // SAFETY: the driver guarantees a NUL-terminated name within the array
    unsafe { CStr::from_ptr(properties.extension_name.as_ptr()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(bytes: &'static [u8]) -> &'static CStr {
        CStr::from_bytes_with_nul(bytes).unwrap()
    }

    #[test]
    fn test_missing_optional_is_none() {
        let surface = name(b"VK_KHR_surface\0");
        let debug = name(b"VK_EXT_debug_utils\0");

        let result = negotiate(
            "instance",
            &[surface],
            &[ExtensionRequest::required(surface), ExtensionRequest::optional(debug)],
        )
        .unwrap();

        assert_eq!(result, vec![Some(surface), None]);
        assert_eq!(enabled_pointers(&result).len(), 1);
    }

    #[test]
    fn test_missing_required_fails() {
        let swapchain = name(b"VK_KHR_swapchain\0");
        let err = negotiate("device", &[], &[ExtensionRequest::required(swapchain)]).unwrap_err();

        assert!(err.to_string().contains("VK_KHR_swapchain"));
    }
}
