// Vulkan rendering components

pub mod frame_targets;
pub mod pipeline;
pub mod shader;
pub mod vertex_layout;

pub use frame_targets::FrameTargets;
pub use pipeline::PipelineSet;
pub use shader::{ShaderLibrary, ShaderStage};
pub use vertex_layout::Vertex;
