//! Device context state machine, swapchain lifecycle and the recreation
//! protocol

pub mod context;
pub mod protocol;
pub mod registry;
pub mod swapchain;

pub use context::{ContextState, DeviceContext};
pub use protocol::Recreation;
pub use registry::{DeviceResource, LifecycleRegistry, SwapchainResource};
pub use swapchain::{Swapchain, SwapchainParams, SwapchainState};
