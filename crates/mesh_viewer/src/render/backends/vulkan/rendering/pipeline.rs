//! Graphics pipelines for the three shader variants
//!
//! Viewport and scissor are baked in, so the pipelines are rebuilt with the
//! swapchain. All variants share one layout: the model's descriptor set at
//! set 0 and a material set at set 1, both with the same bindings.

use std::ffi::CStr;
use std::sync::Arc;

use ash::vk;

use super::shader::ShaderLibrary;
use super::vertex_layout::Vertex;
use crate::render::backends::vulkan::core::error::{VulkanError, VulkanResult};
use crate::render::backends::vulkan::core::handle::{Pipeline, PipelineLayout};
use crate::render::backends::vulkan::initialization::device::LogicalDevice;
use crate::render::backends::vulkan::state::registry::SwapchainResource;
use crate::render::backends::vulkan::state::swapchain::SwapchainState;
use crate::render::ShaderType;

const ENTRY_POINT: &CStr =
    // SAFETY: literal is NUL-terminated with no interior NUL
    unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

impl Pipeline {
    /// Create one graphics pipeline
    pub fn new_graphics(device: &Arc<LogicalDevice>, info: &vk::GraphicsPipelineCreateInfo) -> VulkanResult<Self> {
        let pipelines = unsafe {
            device
                .raw()
                .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(info), None)
        }
        .map_err(|(_, code)| VulkanError::native("pipeline", code))?;

        pipelines
            .into_iter()
            .next()
            .map(|raw| Self::adopt(device, raw))
            .ok_or_else(|| VulkanError::validation("pipeline", "driver returned no pipeline"))
    }
}

/// Polygon mode for a variant
pub const fn polygon_mode(variant: ShaderType) -> vk::PolygonMode {
    match variant {
        ShaderType::Wireframe => vk::PolygonMode::LINE,
        _ => vk::PolygonMode::FILL,
    }
}

/// Viewport covering `extent` with depth in [0, 1]
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// One pipeline per [`ShaderType`], indexed by [`ShaderType::index`]
#[derive(Debug)]
pub struct PipelineSet {
    pipelines: Vec<Pipeline>,
    layout: PipelineLayout,
    render_pass: vk::RenderPass,
    library: ShaderLibrary,
    device: Arc<LogicalDevice>,
}

impl PipelineSet {
    /// Create the shared layout; pipelines are built on swapchain creation
    pub fn new(
        device: &Arc<LogicalDevice>,
        library: ShaderLibrary,
        set_layout: vk::DescriptorSetLayout,
        render_pass: vk::RenderPass,
    ) -> VulkanResult<Self> {
        let set_layouts = [set_layout, set_layout];
        let info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
        let layout = PipelineLayout::new(device, &info)?;

        Ok(Self {
            pipelines: Vec::new(),
            layout,
            render_pass,
            library,
            device: Arc::clone(device),
        })
    }

    /// Shared pipeline layout
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.handle()
    }

    /// Pipeline for a variant
    pub fn pipeline(&self, variant: ShaderType) -> VulkanResult<vk::Pipeline> {
        self.pipelines
            .get(variant.index())
            .map(Pipeline::handle)
            .ok_or_else(|| VulkanError::validation("pipeline", format!("{variant:?} pipeline is not built")))
    }

    /// Whether every variant has a pipeline
    pub fn is_built(&self) -> bool {
        self.pipelines.len() == ShaderType::ALL.len()
    }

    fn build(&self, variant: ShaderType, extent: vk::Extent2D) -> VulkanResult<Pipeline> {
        let modules = self.library.load_variant(&self.device, variant)?;
        let stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(modules.vertex.handle())
                .name(ENTRY_POINT)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(modules.fragment.handle())
                .name(ENTRY_POINT)
                .build(),
        ];

        let bindings = [Vertex::binding_description()];
        let attributes = Vertex::attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewports = [full_viewport(extent)];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        // No culling: loaded meshes do not agree on winding
        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(polygon_mode(variant))
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .layout(self.layout.handle())
            .render_pass(self.render_pass)
            .subpass(0)
            .build();

        let pipeline = Pipeline::new_graphics(&self.device, &info)?;
        log::debug!("[pipeline] Built {:?} pipeline at {}x{}", variant, extent.width, extent.height);
        Ok(pipeline)
    }
}

impl SwapchainResource for PipelineSet {
    fn on_swapchain_created(&mut self, state: &SwapchainState) -> VulkanResult<()> {
        let pipelines = ShaderType::ALL
            .iter()
            .map(|variant| self.build(*variant, state.extent))
            .collect::<VulkanResult<Vec<_>>>()?;
        self.pipelines = pipelines;
        Ok(())
    }

    fn on_swapchain_destroyed(&mut self) {
        self.pipelines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_wireframe_draws_lines() {
        assert_eq!(polygon_mode(ShaderType::Wireframe), vk::PolygonMode::LINE);
        assert_eq!(polygon_mode(ShaderType::Lit), vk::PolygonMode::FILL);
        assert_eq!(polygon_mode(ShaderType::TexturedMaterial), vk::PolygonMode::FILL);
    }

    #[test]
    fn test_viewport_covers_extent() {
        let viewport = full_viewport(vk::Extent2D { width: 640, height: 480 });
        assert!((viewport.width - 640.0).abs() < f32::EPSILON);
        assert!((viewport.height - 480.0).abs() < f32::EPSILON);
        assert!((viewport.max_depth - 1.0).abs() < f32::EPSILON);
    }
}
