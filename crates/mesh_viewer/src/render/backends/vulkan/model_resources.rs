//! GPU-side state of one model
//!
//! Every model owns a full descriptor bundle (pool, set, two uniform buffers
//! and a texture) plus its vertex buffer. Nothing is shared between models.
//!
//! Descriptor bindings, identical at set 0 and set 1:
//!
//! | binding | type                   | stage    |
//! |---------|------------------------|----------|
//! | 0       | uniform `MvpUniform`   | vertex   |
//! | 1       | uniform `TextureFlag`  | fragment |
//! | 2       | combined image sampler | fragment |

use std::sync::Arc;

use ash::vk;
use bytemuck::{Pod, Zeroable};

use super::core::descriptor::{DescriptorSetLayoutBuilder, DescriptorWrites};
use super::core::error::VulkanResult;
use super::core::handle::{CommandPool, DescriptorPool, DescriptorSetLayout};
use super::initialization::device::LogicalDevice;
use super::rendering::Vertex;
use super::resources::texture::has_texture_flag;
use super::resources::{Buffer, Texture};
use crate::foundation::math::{to_gpu_matrix, Mat4};
use crate::scene::Model;

/// Binding of the matrix uniform
pub const MVP_BINDING: u32 = 0;
/// Binding of the has-texture uniform
pub const TEXTURE_FLAG_BINDING: u32 = 1;
/// Binding of the diffuse sampler
pub const SAMPLER_BINDING: u32 = 2;

/// Matrices consumed by every vertex shader
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MvpUniform {
    /// Model-to-world
    pub model: [[f32; 4]; 4],
    /// World-to-view
    pub view: [[f32; 4]; 4],
    /// View-to-clip
    pub projection: [[f32; 4]; 4],
}

impl MvpUniform {
    /// Pack matrices into GLSL layout
    pub fn new(model: &Mat4, view: &Mat4, projection: &Mat4) -> Self {
        Self {
            model: to_gpu_matrix(model),
            view: to_gpu_matrix(view),
            projection: to_gpu_matrix(projection),
        }
    }
}

/// `uint hasTexture` padded to a 16-byte uniform block
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct TextureFlagUniform {
    /// 1 when real texture data was loaded
    pub has_texture: u32,
    padding: [u32; 3],
}

impl TextureFlagUniform {
    /// Flag block for a texture
    pub const fn new(has_texture: bool) -> Self {
        Self {
            has_texture: has_texture_flag(has_texture),
            padding: [0; 3],
        }
    }
}

/// Layout shared by model sets and the dummy material set
pub fn create_set_layout(device: &Arc<LogicalDevice>) -> VulkanResult<DescriptorSetLayout> {
    DescriptorSetLayoutBuilder::new()
        .uniform_buffer(MVP_BINDING, vk::ShaderStageFlags::VERTEX)
        .uniform_buffer(TEXTURE_FLAG_BINDING, vk::ShaderStageFlags::FRAGMENT)
        .combined_image_sampler(SAMPLER_BINDING, vk::ShaderStageFlags::FRAGMENT)
        .build(device)
}

/// Pool sizes for exactly one set: two uniform buffers and one sampler
pub const fn pool_sizes() -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 2,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 1,
        },
    ]
}

/// Interleave a model's shapes into one triangle list
///
/// Missing normals or texture coordinates become zero. V is flipped because
/// decoded images start at the top row.
pub fn build_vertices(model: &Model) -> Vec<Vertex> {
    let mut vertices = Vec::with_capacity(model.vertex_count());
    for shape in &model.shapes {
        for (index, position) in shape.positions.iter().enumerate() {
            let normal = shape.normals.get(index).copied().unwrap_or_default();
            let uv = shape
                .tex_coords
                .get(index)
                .map_or([0.0, 0.0], |[u, v]| [*u, 1.0 - *v]);
            vertices.push(Vertex {
                position: *position,
                normal,
                uv,
            });
        }
    }
    vertices
}

/// Pool, set, uniform buffers and texture for one descriptor set
///
/// Fields drop top to bottom: the pool (and with it the set) goes first.
#[derive(Debug)]
pub struct DescriptorBundle {
    _pool: DescriptorPool,
    set: vk::DescriptorSet,
    mvp: Buffer,
    _texture_flag: Buffer,
    texture: Texture,
}

impl DescriptorBundle {
    /// Allocate the set and write all three bindings
    pub fn new(device: &Arc<LogicalDevice>, layout: vk::DescriptorSetLayout, texture: Texture) -> VulkanResult<Self> {
        let mut mvp = Buffer::host_visible(
            device,
            std::mem::size_of::<MvpUniform>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
        )?;
        let identity = Mat4::identity();
        mvp.write_pod(0, &MvpUniform::new(&identity, &identity, &identity))?;

        let mut texture_flag = Buffer::host_visible(
            device,
            std::mem::size_of::<TextureFlagUniform>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
        )?;
        texture_flag.write_pod(0, &TextureFlagUniform::new(texture.has_texture()))?;

        let pool = DescriptorPool::new(device, 1, &pool_sizes())?;
        let mut sets = [vk::DescriptorSet::null()];
        pool.allocate_sets(&mut sets, &[layout])?;
        let set = sets[0];

        DescriptorWrites::new()
            .uniform_buffer(set, MVP_BINDING, mvp.handle())
            .uniform_buffer(set, TEXTURE_FLAG_BINDING, texture_flag.handle())
            .combined_image_sampler(set, SAMPLER_BINDING, texture.view(), texture.sampler())
            .update(device);

        Ok(Self {
            _pool: pool,
            set,
            mvp,
            _texture_flag: texture_flag,
            texture,
        })
    }

    /// Descriptor set handle
    pub const fn set(&self) -> vk::DescriptorSet {
        self.set
    }

    /// Texture bound at the sampler binding
    pub const fn texture(&self) -> &Texture {
        &self.texture
    }

    /// Overwrite the matrix uniform
    ///
    /// The caller must know the GPU is no longer reading the buffer.
    pub fn update_mvp(&mut self, uniform: &MvpUniform) -> VulkanResult<()> {
        self.mvp.write_pod(0, uniform)
    }
}

/// Everything drawn for one model
#[derive(Debug)]
pub struct ModelResources {
    descriptors: DescriptorBundle,
    vertices: Buffer,
    vertex_count: u32,
}

impl ModelResources {
    /// Upload a model's geometry and texture
    pub fn new(
        device: &Arc<LogicalDevice>,
        pool: &CommandPool,
        layout: vk::DescriptorSetLayout,
        model: &Model,
    ) -> VulkanResult<Self> {
        let texture = Texture::load_or_white(device, pool, model.diffuse_texture())?;
        let descriptors = DescriptorBundle::new(device, layout, texture)?;

        let vertex_data = build_vertices(model);
        // Zero-sized buffers are invalid; an empty model keeps one slot
        let capacity = vertex_data.len().max(1) * std::mem::size_of::<Vertex>();
        let mut vertices = Buffer::host_visible(
            device,
            capacity as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        vertices.write_slice(0, &vertex_data)?;

        log::debug!(
            "[model] Uploaded '{}' with {} vertices (textured: {})",
            model.name,
            vertex_data.len(),
            descriptors.texture().has_texture()
        );
        Ok(Self {
            descriptors,
            vertices,
            vertex_count: vertex_data.len() as u32,
        })
    }

    /// Descriptor set bound at set 0 (and set 1 for textured materials)
    pub const fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptors.set()
    }

    /// Vertex buffer handle
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertices.handle()
    }

    /// Vertices to draw
    pub const fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Whether the model's own texture was loaded
    pub const fn has_texture(&self) -> bool {
        self.descriptors.texture().has_texture()
    }

    /// Write this frame's matrices
    pub fn update_mvp(&mut self, model: &Mat4, view: &Mat4, projection: &Mat4) -> VulkanResult<()> {
        self.descriptors
            .update_mvp(&MvpUniform::new(model, view, projection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::resources::texture::TexturePixels;
    use crate::scene::Shape;
    use std::path::PathBuf;

    fn triangle(with_attributes: bool) -> Shape {
        Shape {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: if with_attributes {
                vec![[0.0, 0.0, 1.0]; 3]
            } else {
                Vec::new()
            },
            tex_coords: if with_attributes {
                vec![[0.0, 0.0], [1.0, 0.25], [0.5, 1.0]]
            } else {
                Vec::new()
            },
            diffuse_texture: PathBuf::new(),
        }
    }

    #[test]
    fn test_vertices_flip_v() {
        let model = Model::new("tri").with_shape(triangle(true));
        let vertices = build_vertices(&model);

        assert_eq!(vertices.len(), 3);
        assert_eq!(vertices[0].uv, [0.0, 1.0]);
        assert_eq!(vertices[1].uv, [1.0, 0.75]);
        assert_eq!(vertices[2].uv, [0.5, 0.0]);
        assert_eq!(vertices[1].normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_missing_attributes_are_zeroed() {
        let model = Model::new("bare").with_shape(triangle(false));
        let vertices = build_vertices(&model);

        assert!(vertices.iter().all(|v| v.normal == [0.0; 3] && v.uv == [0.0; 2]));
        assert_eq!(vertices[2].position, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_shapes_are_concatenated_in_order() {
        let model = Model::new("two")
            .with_shape(triangle(true))
            .with_shape(triangle(false));
        let vertices = build_vertices(&model);

        assert_eq!(vertices.len(), model.vertex_count());
        assert_eq!(vertices[3].uv, [0.0, 0.0]);
    }

    #[test]
    fn test_untextured_model_gets_its_own_white_fallback() {
        let model = Model::new("bare").with_shape(triangle(false));
        assert_eq!(model.diffuse_texture(), None);

        // Same pixels Texture::load_or_white uploads for this model
        let (pixels, has_texture) = TexturePixels::load_or_white(model.diffuse_texture());
        assert!(!has_texture);
        assert_eq!(pixels, TexturePixels::solid([255; 4]));
        assert_eq!(TextureFlagUniform::new(has_texture).has_texture, 0);
    }

    #[test]
    fn test_uniform_blocks_match_glsl_sizes() {
        assert_eq!(std::mem::size_of::<MvpUniform>(), 192);
        assert_eq!(std::mem::size_of::<TextureFlagUniform>(), 16);
        assert_eq!(TextureFlagUniform::new(true).has_texture, 1);
        assert_eq!(TextureFlagUniform::new(false).has_texture, 0);
    }

    #[test]
    fn test_pool_holds_exactly_one_set() {
        let sizes = pool_sizes();
        let uniforms: u32 = sizes
            .iter()
            .filter(|size| size.ty == vk::DescriptorType::UNIFORM_BUFFER)
            .map(|size| size.descriptor_count)
            .sum();
        let samplers: u32 = sizes
            .iter()
            .filter(|size| size.ty == vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .map(|size| size.descriptor_count)
            .sum();
        assert_eq!((uniforms, samplers), (2, 1));
    }
}
