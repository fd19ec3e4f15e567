//! Vulkan initialization types
//!
//! Instance creation, extension negotiation, queue family discovery, the
//! logical device and the presentation surface.

pub mod device;
pub mod extensions;
pub mod instance;
pub mod queue_family;
pub mod surface;
