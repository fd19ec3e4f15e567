//! Vulkan backend errors

use ash::vk;
use thiserror::Error;

use super::status::RESULT_MAX;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// A native call returned a failure code
    #[error("[{kind}] Vulkan call failed: {code:?}")]
    Native {
        /// Component that issued the call
        kind: &'static str,
        /// Code returned by the driver
        code: vk::Result,
    },

    /// A request was rejected before reaching the driver
    #[error("[{kind}] {reason}")]
    Validation {
        /// Component that rejected the request
        kind: &'static str,
        /// Why the request was rejected
        reason: String,
    },

    /// The system cannot run the viewer at all (no devices, no formats, ...)
    #[error("Unrecoverable environment failure: {0}")]
    Environment(String),

    /// The Vulkan loader library could not be loaded
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// No memory type satisfies the requested properties
    #[error("No suitable memory type for {0:?}")]
    NoSuitableMemoryType(vk::MemoryPropertyFlags),

    /// A SPIR-V blob could not be read or decoded
    #[error("Invalid shader {path}: {reason}")]
    Shader {
        /// Blob that failed
        path: String,
        /// Decoder message
        reason: String,
    },

    /// Texture decoding failed
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// File access failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VulkanError {
    /// Native failure, logged with its component and code
    pub fn native(kind: &'static str, code: vk::Result) -> Self {
        log::error!("[{}] ERROR: Vulkan call failed with {:?}", kind, code);
        Self::Native { kind, code }
    }

    /// Local validation failure, logged with its component
    pub fn validation(kind: &'static str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        log::error!("[{}] ERROR: {}", kind, reason);
        Self::Validation { kind, reason }
    }

    /// Unrecoverable environment failure, logged at detection
    pub fn environment(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        log::error!("[environment] FATAL: {}", reason);
        Self::Environment(reason)
    }

    /// Native code for driver failures, [`RESULT_MAX`] for everything else
    pub const fn code(&self) -> vk::Result {
        match self {
            Self::Native { code, .. } => *code,
            _ => RESULT_MAX,
        }
    }

    /// Whether the process cannot continue after this error
    pub const fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            Self::Environment(_)
                | Self::Loading(_)
                | Self::Native { code: vk::Result::ERROR_DEVICE_LOST, .. }
        )
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(
            VulkanError::native("fence", vk::Result::ERROR_DEVICE_LOST).code(),
            vk::Result::ERROR_DEVICE_LOST
        );
        assert_eq!(VulkanError::validation("fence", "empty").code(), RESULT_MAX);
        assert_eq!(VulkanError::Environment("no gpu".into()).code(), RESULT_MAX);
    }

    #[test]
    fn test_environment_failures_are_unrecoverable() {
        assert!(VulkanError::environment("no devices").is_unrecoverable());
        assert!(VulkanError::native("queue", vk::Result::ERROR_DEVICE_LOST).is_unrecoverable());
        assert!(!VulkanError::validation("pool", "arity").is_unrecoverable());
    }
}
