//! Vulkan backend implementation
//!
//! Organized into core, resources, initialization, state and rendering
//! modules, with the submission protocol and the renderer on top.

/// Status signal, errors and generic handle wrappers
pub mod core;

/// Device memory and memory-backed buffers and images
pub mod resources;

/// Instance, queue family discovery, logical device and surface
pub mod initialization;

/// Device context, swapchain, lifecycle registry and recreation protocol
pub mod state;

/// Shader library, vertex layout, frame targets and pipelines
pub mod rendering;

/// Queue submission and queue-family ownership transfer
pub mod submit;

/// Per-model GPU resources
pub mod model_resources;

/// Vulkan implementation of the render backend
pub mod renderer;

pub use self::core::error::{VulkanError, VulkanResult};
pub use self::core::handle::DeviceHandle;
pub use self::core::status::{set_failure_hook, Status, RESULT_MAX};
pub use initialization::device::LogicalDevice;
pub use initialization::queue_family::{QueueFamilyIndices, QueueRoles};
pub use initialization::surface::SurfaceProvider;
pub use renderer::{RendererSettings, VulkanRenderer};
pub use state::context::{ContextState, DeviceContext};
