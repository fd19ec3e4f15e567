//! Device memory and the resources bound to it

pub mod bound;
pub mod memory;
pub mod texture;

pub use bound::{BoundResource, Buffer, Image, MemoryBindable};
pub use memory::{align_non_coherent_range, AlignedRange, DeviceMemory};
pub use texture::Texture;
