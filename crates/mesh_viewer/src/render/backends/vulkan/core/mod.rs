//! Core Vulkan types
//!
//! Everything here owns exactly one native object (or a pool-owned batch of
//! them) and knows how to destroy it.

pub mod commands;
pub mod descriptor;
pub mod error;
pub mod handle;
pub mod query;
pub mod render_pass;
pub mod status;
pub mod sync;
