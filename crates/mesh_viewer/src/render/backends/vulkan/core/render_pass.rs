//! Render pass creation and recording

use std::sync::Arc;

use ash::vk;

use super::commands::CommandBuffer;
use super::error::VulkanResult;
use super::handle::RenderPass;
use crate::render::backends::vulkan::initialization::device::LogicalDevice;

impl RenderPass {
    /// Create a render pass from a full description
    pub fn new(device: &Arc<LogicalDevice>, info: &vk::RenderPassCreateInfo) -> VulkanResult<Self> {
        Self::create_with(device, |raw| unsafe { raw.create_render_pass(info, None) })
    }

    /// Single-subpass forward pass: one presentable color target plus depth
    ///
    /// Color is cleared and ends in `PRESENT_SRC_KHR`; depth is cleared and
    /// discarded.
    pub fn new_forward(device: &Arc<LogicalDevice>, color_format: vk::Format, depth_format: vk::Format) -> VulkanResult<Self> {
        let attachments = [
            vk::AttachmentDescription::builder()
                .format(color_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                .build(),
            vk::AttachmentDescription::builder()
                .format(depth_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::CLEAR)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .build(),
        ];

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let subpasses = [vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref)
            .build()];

        // Order attachment writes after the acquire semaphore wait and the
        // previous frame's depth use
        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        let dependencies = [vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(stages | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS)
            .dst_stage_mask(stages)
            .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .build()];

        let info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let pass = Self::new(device, &info)?;
        log::debug!("[renderPass] Created forward pass ({:?} + {:?})", color_format, depth_format);
        Ok(pass)
    }

    /// Begin the pass; `clear_values` follow attachment order
    pub fn begin(
        &self,
        cmd: &CommandBuffer,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
        contents: vk::SubpassContents,
    ) -> VulkanResult<()> {
        let device = self.device()?;
        let info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.handle())
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);
        unsafe { device.raw().cmd_begin_render_pass(cmd.raw(), &info, contents) };
        Ok(())
    }

    /// Advance to the next subpass
    pub fn next_subpass(&self, cmd: &CommandBuffer, contents: vk::SubpassContents) -> VulkanResult<()> {
        let device = self.device()?;
        unsafe { device.raw().cmd_next_subpass(cmd.raw(), contents) };
        Ok(())
    }

    /// End the pass
    pub fn end(&self, cmd: &CommandBuffer) -> VulkanResult<()> {
        let device = self.device()?;
        unsafe { device.raw().cmd_end_render_pass(cmd.raw()) };
        Ok(())
    }
}

/// Clear values for the forward pass: background color, then depth 1.0 / stencil 0
pub fn forward_clear_values(color: [f32; 4]) -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_values_follow_attachment_order() {
        let values = forward_clear_values([0.25, 0.5, 0.75, 1.0]);
        // SAFETY: the union fields read are the ones written above
        let (color, depth) = unsafe { (values[0].color.float32, values[1].depth_stencil) };

        assert_eq!(color, [0.25, 0.5, 0.75, 1.0]);
        assert!((depth.depth - 1.0).abs() < f32::EPSILON);
        assert_eq!(depth.stencil, 0);
    }
}
