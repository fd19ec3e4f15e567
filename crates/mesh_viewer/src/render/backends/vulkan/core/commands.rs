//! Command pools and command buffer recording
//!
//! Command buffers are owned by their pool: [`CommandPool::allocate`] hands
//! out raw handles, [`CommandPool::free`] returns them and nulls the caller's
//! slots so a second free is a no-op.

use std::sync::Arc;

use ash::vk;

use super::error::{VulkanError, VulkanResult};
use super::handle::{live_handles, zero_handles, CommandPool};
use crate::render::backends::vulkan::initialization::device::LogicalDevice;

impl CommandPool {
    /// Create a pool for one queue family
    pub fn new(
        device: &Arc<LogicalDevice>,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> VulkanResult<Self> {
        let info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(queue_family)
            .flags(flags);
        let pool = Self::create_with(device, |raw| unsafe { raw.create_command_pool(&info, None) })?;
        log::debug!("[commandPool] Created pool for queue family {}", queue_family);
        Ok(pool)
    }

    /// Allocate `count` command buffers at the given level
    pub fn allocate(&self, level: vk::CommandBufferLevel, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let device = self.device()?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.handle())
            .level(level)
            .command_buffer_count(count);
        unsafe { device.raw().allocate_command_buffers(&info) }
            .map_err(|code| VulkanError::native("commandPool", code))
    }

    /// Allocate a single primary buffer wrapped for recording
    pub fn allocate_primary(&self) -> VulkanResult<CommandBuffer> {
        let device = Arc::clone(self.device()?);
        let raw = self
            .allocate(vk::CommandBufferLevel::PRIMARY, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::validation("commandPool", "driver returned no command buffer"))?;
        Ok(CommandBuffer::new(device, raw))
    }

    /// Return buffers to the pool and null the freed slots
    ///
    /// Null entries are skipped, so freeing an already-freed batch does
    /// nothing.
    pub fn free(&self, buffers: &mut [vk::CommandBuffer]) -> VulkanResult<()> {
        let live = live_handles(buffers);
        if live.is_empty() {
            return Ok(());
        }
        let device = self.device()?;
        unsafe { device.raw().free_command_buffers(self.handle(), &live) };
        zero_handles(buffers);
        Ok(())
    }
}

/// Recording wrapper around a pool-owned command buffer
///
/// Non-owning: dropping it does not free the buffer, the pool does. It is
/// not `Clone` so each allocation has one recorder.
#[derive(Debug)]
pub struct CommandBuffer {
    device: Arc<LogicalDevice>,
    raw: vk::CommandBuffer,
}

impl CommandBuffer {
    /// Wrap a raw buffer allocated from a pool on `device`
    pub const fn new(device: Arc<LogicalDevice>, raw: vk::CommandBuffer) -> Self {
        Self { device, raw }
    }

    /// Raw handle
    pub const fn raw(&self) -> vk::CommandBuffer {
        self.raw
    }

    /// Device the buffer records for
    pub const fn device(&self) -> &Arc<LogicalDevice> {
        &self.device
    }

    /// Begin recording
    ///
    /// `inheritance` is required for secondary buffers and ignored for
    /// primaries.
    pub fn begin(
        &self,
        usage: vk::CommandBufferUsageFlags,
        inheritance: Option<&vk::CommandBufferInheritanceInfo>,
    ) -> VulkanResult<()> {
        let mut info = vk::CommandBufferBeginInfo::builder().flags(usage);
        if let Some(inheritance) = inheritance {
            info = info.inheritance_info(inheritance);
        }
        unsafe { self.device.raw().begin_command_buffer(self.raw, &info) }
            .map_err(|code| VulkanError::native("commandBuffer", code))
    }

    /// Finish recording
    pub fn end(&self) -> VulkanResult<()> {
        unsafe { self.device.raw().end_command_buffer(self.raw) }
            .map_err(|code| VulkanError::native("commandBuffer", code))
    }

    /// Reset to the initial state (pool must allow individual resets)
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .raw()
                .reset_command_buffer(self.raw, vk::CommandBufferResetFlags::empty())
        }
        .map_err(|code| VulkanError::native("commandBuffer", code))
    }

    /// Record a pipeline barrier
    pub fn pipeline_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        buffer_barriers: &[vk::BufferMemoryBarrier],
        image_barriers: &[vk::ImageMemoryBarrier],
    ) {
        unsafe {
            self.device.raw().cmd_pipeline_barrier(
                self.raw,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                buffer_barriers,
                image_barriers,
            );
        }
    }

    /// Bind a graphics pipeline
    pub fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .raw()
                .cmd_bind_pipeline(self.raw, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    /// Bind descriptor sets starting at `first_set`
    pub fn bind_descriptor_sets(&self, layout: vk::PipelineLayout, first_set: u32, sets: &[vk::DescriptorSet]) {
        unsafe {
            self.device.raw().cmd_bind_descriptor_sets(
                self.raw,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                first_set,
                sets,
                &[],
            );
        }
    }

    /// Bind one vertex buffer at binding 0
    pub fn bind_vertex_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.device.raw().cmd_bind_vertex_buffers(self.raw, 0, &[buffer], &[0]) };
    }

    /// Non-indexed draw
    pub fn draw(&self, vertex_count: u32, instance_count: u32) {
        unsafe { self.device.raw().cmd_draw(self.raw, vertex_count, instance_count, 0, 0) };
    }

    /// Copy a whole buffer into a 2D color image in `TRANSFER_DST_OPTIMAL`
    pub fn copy_buffer_to_image(&self, buffer: vk::Buffer, image: vk::Image, extent: vk::Extent2D) {
        let region = vk::BufferImageCopy::builder()
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });
        unsafe {
            self.device.raw().cmd_copy_buffer_to_image(
                self.raw,
                buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region.build()],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_freeing_null_buffers_is_a_no_op() {
        let pool = CommandPool::empty();
        let mut buffers = [vk::CommandBuffer::null(); 3];

        assert!(pool.free(&mut buffers).is_ok());
        assert!(buffers.iter().all(|buffer| *buffer == vk::CommandBuffer::null()));
    }

    #[test]
    fn test_allocating_from_empty_pool_fails_locally() {
        let pool = CommandPool::empty();
        let err = pool.allocate(vk::CommandBufferLevel::PRIMARY, 2).unwrap_err();
        assert!(matches!(err, VulkanError::Validation { .. }));
    }

    #[test]
    fn test_live_buffers_need_a_pool() {
        let pool = CommandPool::empty();
        let mut buffers = [vk::CommandBuffer::from_raw(0x10)];
        assert!(pool.free(&mut buffers).is_err());
        // Nothing was freed, so the slot keeps its handle
        assert_ne!(buffers[0], vk::CommandBuffer::null());
    }
}
