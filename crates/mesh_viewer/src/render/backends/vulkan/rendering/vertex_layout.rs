//! Interleaved vertex format shared by every shader variant

use ash::vk;
use bytemuck::{Pod, Zeroable};

/// Position, normal and texture coordinate, tightly packed
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Texture coordinate, V already flipped for Vulkan
    pub uv: [f32; 2],
}

impl Vertex {
    /// Bytes between consecutive vertices
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;

    /// Binding 0, advanced per vertex
    pub const fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: Self::STRIDE,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Locations 0 (position), 1 (normal) and 2 (uv)
    pub const fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 12,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: 24,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_matches_struct() {
        assert_eq!(Vertex::STRIDE, 32);

        let vertex = Vertex {
            position: [1.0, 2.0, 3.0],
            normal: [4.0, 5.0, 6.0],
            uv: [7.0, 8.0],
        };
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&vertex));
        for attribute in Vertex::attribute_descriptions() {
            let first = attribute.offset as usize / 4;
            assert_eq!(floats[first], [1.0, 4.0, 7.0][attribute.location as usize]);
        }
    }
}
