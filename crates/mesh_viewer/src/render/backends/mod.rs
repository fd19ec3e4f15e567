//! Graphics backend implementations
//!
//! Only the Vulkan backend ships in this build; the OpenGL variant of
//! [`crate::render::BackendKind`] reports itself unavailable.

pub mod vulkan;
