//! Render pass, depth attachment and one framebuffer per swapchain image

use std::sync::Arc;

use ash::vk;

use crate::render::backends::vulkan::core::error::{VulkanError, VulkanResult};
use crate::render::backends::vulkan::core::handle::{Framebuffer, ImageView, RenderPass};
use crate::render::backends::vulkan::initialization::device::LogicalDevice;
use crate::render::backends::vulkan::resources::Image;
use crate::render::backends::vulkan::state::registry::SwapchainResource;
use crate::render::backends::vulkan::state::swapchain::SwapchainState;

/// Depth formats in order of preference
pub const DEPTH_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// First candidate for which `supported` holds
pub fn pick_depth_format(candidates: &[vk::Format], supported: impl Fn(vk::Format) -> bool) -> Option<vk::Format> {
    candidates.iter().copied().find(|format| supported(*format))
}

fn depth_attachment_supported(device: &LogicalDevice, format: vk::Format) -> bool {
    let properties = unsafe {
        device
            .instance()
            .raw()
            .get_physical_device_format_properties(device.physical().raw, format)
    };
    properties
        .optimal_tiling_features
        .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
}

/// Swapchain-sized render targets
///
/// The render pass survives recreation (the color format does not change);
/// the depth image and framebuffers follow the swapchain.
#[derive(Debug)]
pub struct FrameTargets {
    framebuffers: Vec<Framebuffer>,
    depth_view: Option<ImageView>,
    depth: Option<Image>,
    render_pass: RenderPass,
    depth_format: vk::Format,
    extent: vk::Extent2D,
    device: Arc<LogicalDevice>,
}

impl FrameTargets {
    /// Create the forward render pass for `color_format`
    pub fn new(device: &Arc<LogicalDevice>, color_format: vk::Format) -> VulkanResult<Self> {
        let depth_format = pick_depth_format(&DEPTH_CANDIDATES, |format| depth_attachment_supported(device, format))
            .ok_or_else(|| VulkanError::environment("no supported depth attachment format"))?;
        let render_pass = RenderPass::new_forward(device, color_format, depth_format)?;

        Ok(Self {
            framebuffers: Vec::new(),
            depth_view: None,
            depth: None,
            render_pass,
            depth_format,
            extent: vk::Extent2D::default(),
            device: Arc::clone(device),
        })
    }

    /// Render pass handle
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    /// Framebuffer for a swapchain image
    pub fn framebuffer(&self, image_index: u32) -> VulkanResult<vk::Framebuffer> {
        self.framebuffers
            .get(image_index as usize)
            .map(Framebuffer::handle)
            .ok_or_else(|| {
                VulkanError::validation(
                    "framebuffer",
                    format!("no framebuffer for image {image_index} ({} built)", self.framebuffers.len()),
                )
            })
    }

    /// Number of framebuffers built
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Size the targets were built for
    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Chosen depth format
    pub const fn depth_format(&self) -> vk::Format {
        self.depth_format
    }
}

impl SwapchainResource for FrameTargets {
    fn on_swapchain_created(&mut self, state: &SwapchainState) -> VulkanResult<()> {
        let depth = Image::new_2d(
            &self.device,
            state.extent,
            self.depth_format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        let depth_view = ImageView::new_2d(&self.device, depth.handle(), self.depth_format, vk::ImageAspectFlags::DEPTH)?;

        let mut framebuffers = Vec::with_capacity(state.image_views.len());
        for view in &state.image_views {
            let attachments = [*view, depth_view.handle()];
            let info = vk::FramebufferCreateInfo::builder()
                .render_pass(self.render_pass.handle())
                .attachments(&attachments)
                .width(state.extent.width)
                .height(state.extent.height)
                .layers(1);
            framebuffers.push(Framebuffer::new(&self.device, &info)?);
        }

        log::debug!(
            "[framebuffer] Built {} framebuffers at {}x{}",
            framebuffers.len(),
            state.extent.width,
            state.extent.height
        );
        self.framebuffers = framebuffers;
        self.depth_view = Some(depth_view);
        self.depth = Some(depth);
        self.extent = state.extent;
        Ok(())
    }

    fn on_swapchain_destroyed(&mut self) {
        self.framebuffers.clear();
        self.depth_view = None;
        self.depth = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_format_preference() {
        let only_packed = |format: vk::Format| format == vk::Format::D24_UNORM_S8_UINT;
        assert_eq!(pick_depth_format(&DEPTH_CANDIDATES, only_packed), Some(vk::Format::D24_UNORM_S8_UINT));
        assert_eq!(pick_depth_format(&DEPTH_CANDIDATES, |_| true), Some(vk::Format::D32_SFLOAT));
        assert_eq!(pick_depth_format(&DEPTH_CANDIDATES, |_| false), None);
    }
}
