//! Queue submission and queue-family ownership transfer
//!
//! When presentation runs on a different family than graphics, a swapchain
//! image written by the graphics queue has to be released by that family and
//! acquired by the presentation family before `vkQueuePresentKHR`. The
//! release barrier goes at the end of the frame's graphics command buffer;
//! the acquire barrier goes into a small presentation-queue submission that
//! waits on render-finished and signals ownership-acquired.

use std::sync::Arc;

use ash::vk;

use crate::render::backends::vulkan::core::commands::CommandBuffer;
use crate::render::backends::vulkan::core::error::VulkanResult;
use crate::render::backends::vulkan::core::handle::{CommandPool, Fence};
use crate::render::backends::vulkan::core::status::Status;
use crate::render::backends::vulkan::initialization::device::LogicalDevice;
use crate::render::backends::vulkan::initialization::queue_family::QueueFamilyIndices;

/// Semaphores and fence attached to one submission
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitSync<'a> {
    /// Semaphores waited on before the commands run
    pub wait: &'a [vk::Semaphore],
    /// Semaphores signalled when the commands finish
    pub signal: &'a [vk::Semaphore],
    /// Fence signalled when the commands finish
    pub fence: Option<vk::Fence>,
}

impl LogicalDevice {
    fn submit_to(
        &self,
        queue: VulkanResult<vk::Queue>,
        cmd: vk::CommandBuffer,
        sync: &SubmitSync<'_>,
        wait_stage: vk::PipelineStageFlags,
    ) -> Status {
        let Ok(queue) = queue else {
            return Status::local_failure();
        };
        let wait_stages = vec![wait_stage; sync.wait.len()];
        let buffers = [cmd];
        let info = vk::SubmitInfo::builder()
            .wait_semaphores(sync.wait)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&buffers)
            .signal_semaphores(sync.signal)
            .build();
        let fence = sync.fence.unwrap_or_default();

        unsafe { self.raw().queue_submit(queue, &[info], fence) }.into()
    }

    /// Submit to the graphics queue; waits happen at `wait_stage`
    ///
    /// Frame rendering passes `COLOR_ATTACHMENT_OUTPUT`.
    pub fn submit_graphics(
        &self,
        cmd: &CommandBuffer,
        sync: &SubmitSync<'_>,
        wait_stage: vk::PipelineStageFlags,
    ) -> Status {
        self.submit_to(self.graphics_queue(), cmd.raw(), sync, wait_stage)
    }

    /// Submit to the compute queue; waits happen at `COMPUTE_SHADER`
    pub fn submit_compute(&self, cmd: &CommandBuffer, sync: &SubmitSync<'_>) -> Status {
        self.submit_to(self.compute_queue(), cmd.raw(), sync, vk::PipelineStageFlags::COMPUTE_SHADER)
    }

    /// Submit to the presentation queue; waits happen at `ALL_COMMANDS`
    pub fn submit_presentation(&self, cmd: &CommandBuffer, sync: &SubmitSync<'_>) -> Status {
        self.submit_to(self.present_queue(), cmd.raw(), sync, vk::PipelineStageFlags::ALL_COMMANDS)
    }

    /// Record with `record`, submit to graphics and block until done
    ///
    /// The command buffer is freed back to `pool` afterwards.
    pub fn submit_one_time<F>(self: &Arc<Self>, pool: &CommandPool, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&CommandBuffer) -> VulkanResult<()>,
    {
        let cmd = pool.allocate_primary()?;
        let result = (|| {
            cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, None)?;
            record(&cmd)?;
            cmd.end()?;

            let fence = Fence::new(self, false)?;
            let sync = SubmitSync {
                fence: Some(fence.handle()),
                ..SubmitSync::default()
            };
            self.submit_graphics(&cmd, &sync, vk::PipelineStageFlags::TOP_OF_PIPE)
                .check("queue")?;
            fence.wait(u64::MAX).map(|_| ())
        })();

        let mut buffers = [cmd.raw()];
        pool.free(&mut buffers)?;
        result
    }
}

/// Whether swapchain images must change queue-family ownership
pub fn needs_ownership_transfer(families: &QueueFamilyIndices) -> bool {
    families.needs_ownership_transfer()
}

fn ownership_barrier(
    image: vk::Image,
    src_family: u32,
    dst_family: u32,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
) -> vk::ImageMemoryBarrier {
    vk::ImageMemoryBarrier::builder()
        .old_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .src_queue_family_index(src_family)
        .dst_queue_family_index(dst_family)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .build()
}

/// Release half of the transfer, recorded on the graphics queue
pub fn release_barrier(image: vk::Image, graphics_family: u32, present_family: u32) -> vk::ImageMemoryBarrier {
    ownership_barrier(
        image,
        graphics_family,
        present_family,
        vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        vk::AccessFlags::empty(),
    )
}

/// Acquire half of the transfer, recorded on the presentation queue
pub fn acquire_barrier(image: vk::Image, graphics_family: u32, present_family: u32) -> vk::ImageMemoryBarrier {
    ownership_barrier(
        image,
        graphics_family,
        present_family,
        vk::AccessFlags::empty(),
        vk::AccessFlags::empty(),
    )
}

/// Record the release barrier at the end of a graphics command buffer
pub fn record_release(cmd: &CommandBuffer, image: vk::Image, families: &QueueFamilyIndices) {
    if let (Some(graphics), Some(present)) = (families.graphics, families.present) {
        if graphics != present {
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                &[],
                &[release_barrier(image, graphics, present)],
            );
        }
    }
}

/// Record the acquire barrier into a presentation-queue command buffer
pub fn record_acquire(cmd: &CommandBuffer, image: vk::Image, families: &QueueFamilyIndices) {
    if let (Some(graphics), Some(present)) = (families.graphics, families.present) {
        if graphics != present {
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                &[],
                &[acquire_barrier(image, graphics, present)],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_transfer_only_for_split_families() {
        let shared = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(0),
            compute: Some(0),
        };
        let split = QueueFamilyIndices {
            present: Some(2),
            ..shared
        };
        let headless = QueueFamilyIndices {
            present: None,
            ..shared
        };

        assert!(!needs_ownership_transfer(&shared));
        assert!(needs_ownership_transfer(&split));
        assert!(!needs_ownership_transfer(&headless));
    }

    #[test]
    fn test_barriers_keep_present_layout_and_move_families() {
        let image = vk::Image::from_raw(0x42);
        let release = release_barrier(image, 0, 2);
        let acquire = acquire_barrier(image, 0, 2);

        for barrier in [&release, &acquire] {
            assert_eq!(barrier.old_layout, vk::ImageLayout::PRESENT_SRC_KHR);
            assert_eq!(barrier.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
            assert_eq!(barrier.src_queue_family_index, 0);
            assert_eq!(barrier.dst_queue_family_index, 2);
            assert_eq!(barrier.image, image);
        }
        assert_eq!(release.src_access_mask, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(acquire.src_access_mask, vk::AccessFlags::empty());
    }
}
