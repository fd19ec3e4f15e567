//! Synchronization primitives
//!
//! Semaphores order GPU work across queues, fences let the host wait for
//! the GPU, and events split a dependency into a signal and a wait inside
//! (or across) command buffers.

use std::sync::Arc;

use ash::vk;

use super::commands::CommandBuffer;
use super::error::{VulkanError, VulkanResult};
use super::handle::{Event, Fence, Semaphore};
use crate::render::backends::vulkan::initialization::device::LogicalDevice;

/// Host-visible state of a fence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The GPU has signaled the fence
    Signaled,
    /// The fence is still pending or was reset
    Unsignaled,
}

/// Host-visible state of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    /// The event is set
    Set,
    /// The event is reset
    Reset,
}

impl Semaphore {
    /// Create a binary semaphore
    pub fn new(device: &Arc<LogicalDevice>) -> VulkanResult<Self> {
        let info = vk::SemaphoreCreateInfo::builder();
        Self::create_with(device, |raw| unsafe { raw.create_semaphore(&info, None) })
    }
}

impl Fence {
    /// Create a fence, optionally already signaled
    pub fn new(device: &Arc<LogicalDevice>, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::builder().flags(flags);
        Self::create_with(device, |raw| unsafe { raw.create_fence(&info, None) })
    }

    /// Block until signaled; returns `false` if the timeout elapsed first
    pub fn wait(&self, timeout_ns: u64) -> VulkanResult<bool> {
        let device = self.device()?;
        match unsafe { device.raw().wait_for_fences(&[self.handle()], true, timeout_ns) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(code) => Err(VulkanError::native("fence", code)),
        }
    }

    /// Return the fence to the unsignaled state
    pub fn reset(&self) -> VulkanResult<()> {
        let device = self.device()?;
        unsafe { device.raw().reset_fences(&[self.handle()]) }.map_err(|code| VulkanError::native("fence", code))
    }

    /// Wait without a timeout, then reset
    pub fn wait_and_reset(&self) -> VulkanResult<()> {
        self.wait(u64::MAX)?;
        self.reset()
    }

    /// Non-blocking poll
    pub fn status(&self) -> VulkanResult<FenceStatus> {
        let device = self.device()?;
        match unsafe { device.raw().get_fence_status(self.handle()) } {
            Ok(true) => Ok(FenceStatus::Signaled),
            Ok(false) | Err(vk::Result::NOT_READY) => Ok(FenceStatus::Unsignaled),
            Err(code) => Err(VulkanError::native("fence", code)),
        }
    }
}

impl Event {
    /// Create an event in the reset state
    pub fn new(device: &Arc<LogicalDevice>) -> VulkanResult<Self> {
        let info = vk::EventCreateInfo::builder();
        Self::create_with(device, |raw| unsafe { raw.create_event(&info, None) })
    }

    /// Set the event from the host
    pub fn set(&self) -> VulkanResult<()> {
        let device = self.device()?;
        unsafe { device.raw().set_event(self.handle()) }.map_err(|code| VulkanError::native("event", code))
    }

    /// Reset the event from the host
    pub fn reset(&self) -> VulkanResult<()> {
        let device = self.device()?;
        unsafe { device.raw().reset_event(self.handle()) }.map_err(|code| VulkanError::native("event", code))
    }

    /// Poll the event from the host
    pub fn status(&self) -> VulkanResult<EventStatus> {
        let device = self.device()?;
        match unsafe { device.raw().get_event_status(self.handle()) } {
            Ok(true) => Ok(EventStatus::Set),
            Ok(false) | Err(vk::Result::EVENT_RESET) => Ok(EventStatus::Reset),
            Err(code) => Err(VulkanError::native("event", code)),
        }
    }

    /// Record a set once `stage` completes
    pub fn cmd_set(&self, cmd: &CommandBuffer, stage: vk::PipelineStageFlags) -> VulkanResult<()> {
        let device = self.device()?;
        unsafe { device.raw().cmd_set_event(cmd.raw(), self.handle(), stage) };
        Ok(())
    }

    /// Record a reset once `stage` completes
    pub fn cmd_reset(&self, cmd: &CommandBuffer, stage: vk::PipelineStageFlags) -> VulkanResult<()> {
        let device = self.device()?;
        unsafe { device.raw().cmd_reset_event(cmd.raw(), self.handle(), stage) };
        Ok(())
    }

    /// Record a wait on this event with the given barriers
    pub fn cmd_wait(
        &self,
        cmd: &CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        memory_barriers: &[vk::MemoryBarrier],
        buffer_barriers: &[vk::BufferMemoryBarrier],
        image_barriers: &[vk::ImageMemoryBarrier],
    ) -> VulkanResult<()> {
        let device = self.device()?;
        unsafe {
            device.raw().cmd_wait_events(
                cmd.raw(),
                &[self.handle()],
                src_stage,
                dst_stage,
                memory_barriers,
                buffer_barriers,
                image_barriers,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_fence_operations_fail_fast() {
        let fence = Fence::empty();
        assert!(fence.wait(0).is_err());
        assert!(fence.reset().is_err());
        assert!(fence.status().is_err());
    }

    #[test]
    fn test_empty_event_operations_fail_fast() {
        let event = Event::empty();
        assert!(event.set().is_err());
        assert!(event.status().is_err());
    }
}
