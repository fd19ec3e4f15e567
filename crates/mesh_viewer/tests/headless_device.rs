//! Device-level checks that need a Vulkan driver but no window
//!
//! Each test skips (passes with a note on stderr) when no loader, driver or
//! suitable physical device is present.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use ash::vk;
use mesh_viewer::render::backends::vulkan::core::handle::{CommandPool, Event, Fence};
use mesh_viewer::render::backends::vulkan::core::sync::{EventStatus, FenceStatus};
use mesh_viewer::render::backends::vulkan::resources::Buffer;
use mesh_viewer::render::backends::vulkan::state::DeviceResource;
use mesh_viewer::render::backends::vulkan::submit::SubmitSync;
use mesh_viewer::render::backends::vulkan::{
    ContextState, DeviceContext, LogicalDevice, QueueRoles, VulkanError, VulkanResult, RESULT_MAX,
};

/// Device dependent that refuses to build a set number of times
struct FlakyDependent {
    failures: usize,
    created: usize,
    destroyed: usize,
}

impl DeviceResource for FlakyDependent {
    fn on_device_created(&mut self, _device: &Arc<LogicalDevice>) -> VulkanResult<()> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(VulkanError::validation("test", "dependent refused the device"));
        }
        self.created += 1;
        Ok(())
    }

    fn on_device_destroyed(&mut self) {
        self.destroyed += 1;
    }
}

fn headless_context(roles: QueueRoles) -> Option<DeviceContext> {
    let mut context = DeviceContext::new();
    if let Err(e) = context.create_instance("mesh_viewer_tests", &[], false) {
        eprintln!("skipping: no Vulkan instance ({e})");
        return None;
    }
    if let Err(e) = context.select_physical_device(roles) {
        eprintln!("skipping: no device for {roles:?} ({e})");
        return None;
    }
    context.create_device().unwrap();
    Some(context)
}

#[test]
fn failed_device_creation_keeps_selection_for_retry() {
    let mut context = DeviceContext::new();
    if context.create_instance("mesh_viewer_tests", &[], false).is_err()
        || context.select_physical_device(QueueRoles::GRAPHICS).is_err()
    {
        eprintln!("skipping: no Vulkan device");
        return;
    }

    let dependent = Rc::new(RefCell::new(FlakyDependent { failures: 1, created: 0, destroyed: 0 }));
    let resource: Rc<RefCell<dyn DeviceResource>> = Rc::<RefCell<FlakyDependent>>::clone(&dependent);
    context.register_device_resource(&resource).unwrap();

    assert!(context.create_device().is_err());
    assert_eq!(context.state(), ContextState::PhysicalDeviceSelected);
    assert!(context.physical_device().is_some());
    assert!(context.device().is_err());
    assert_eq!(dependent.borrow().destroyed, 1);

    context.create_device().unwrap();
    assert_eq!(context.state(), ContextState::DeviceCreated);
    assert_eq!(dependent.borrow().created, 1);

    context.terminate();
    assert_eq!(dependent.borrow().destroyed, 2);
}

#[test]
fn compute_only_context_has_no_presentation() {
    let Some(context) = headless_context(QueueRoles::COMPUTE) else {
        return;
    };

    assert_eq!(context.state(), ContextState::DeviceCreated);
    let families = context.queue_families().unwrap();
    assert!(families.present.is_none());
    assert!(families.graphics.is_none());
    assert!(families.compute.is_some());
    assert_eq!(families.unique_families().len(), 1);

    let device = context.device().unwrap();
    assert!(device.compute_queue().is_ok());
    assert!(device.present_queue().is_err());
}

#[test]
fn swapchain_without_surface_is_rejected() {
    let Some(mut context) = headless_context(QueueRoles::GRAPHICS) else {
        return;
    };

    assert!(context.create_swapchain(false).is_err());
    assert_eq!(context.state(), ContextState::DeviceCreated);
    assert_eq!(context.image_count(), 0);

    context.terminate();
    assert_eq!(context.state(), ContextState::Terminated);
    context.terminate();
}

#[test]
fn fence_wait_and_reset_leaves_it_unsignaled() {
    let Some(context) = headless_context(QueueRoles::GRAPHICS) else {
        return;
    };
    let device = context.device().unwrap();

    let fence = Fence::new(device, true).unwrap();
    assert_eq!(fence.status().unwrap(), FenceStatus::Signaled);

    fence.wait_and_reset().unwrap();
    assert_eq!(fence.status().unwrap(), FenceStatus::Unsignaled);
    assert!(!fence.wait(0).unwrap());
}

#[test]
fn one_time_submission_sets_event_on_the_gpu() {
    let Some(context) = headless_context(QueueRoles::GRAPHICS) else {
        return;
    };
    let device = context.device().unwrap();
    let graphics_family = context.queue_families().unwrap().graphics.unwrap();

    let event = Event::new(device).unwrap();
    assert_eq!(event.status().unwrap(), EventStatus::Reset);

    let pool = CommandPool::new(device, graphics_family, vk::CommandPoolCreateFlags::TRANSIENT).unwrap();
    device
        .submit_one_time(&pool, |cmd| event.cmd_set(cmd, vk::PipelineStageFlags::ALL_COMMANDS))
        .unwrap();
    assert_eq!(event.status().unwrap(), EventStatus::Set);

    event.reset().unwrap();
    assert_eq!(event.status().unwrap(), EventStatus::Reset);
}

#[test]
fn host_visible_buffer_round_trips_bytes() {
    let Some(context) = headless_context(QueueRoles::GRAPHICS) else {
        return;
    };
    let device = context.device().unwrap();

    let mut buffer = Buffer::host_visible(device, 256, vk::BufferUsageFlags::UNIFORM_BUFFER).unwrap();
    let payload: Vec<u8> = (0..=255).collect();
    buffer.write_bytes(0, &payload[..100]).unwrap();
    buffer.write_bytes(100, &payload[100..]).unwrap();

    assert_eq!(buffer.read_bytes(0, 256).unwrap(), payload);
    assert_eq!(buffer.read_bytes(37, 5).unwrap(), payload[37..42]);
    assert!(buffer.write_bytes(1 << 30, &payload[..16]).is_err());
}

#[test]
fn submit_to_missing_queue_fails_locally() {
    let Some(context) = headless_context(QueueRoles::COMPUTE) else {
        return;
    };
    let device = context.device().unwrap();
    let compute_family = context.queue_families().unwrap().compute.unwrap();

    let pool = CommandPool::new(device, compute_family, vk::CommandPoolCreateFlags::empty()).unwrap();
    let cmd = pool.allocate_primary().unwrap();

    let status = device.submit_graphics(&cmd, &SubmitSync::default(), vk::PipelineStageFlags::TOP_OF_PIPE);
    assert!(!status.is_success());
    assert_eq!(status.code(), RESULT_MAX);
    assert!(status.check("queue").is_err());

    let mut buffers = [cmd.raw()];
    pool.free(&mut buffers).unwrap();
    assert_eq!(buffers[0], vk::CommandBuffer::null());
    pool.free(&mut buffers).unwrap();
}

#[test]
fn dropping_a_command_buffer_leaves_it_to_the_pool() {
    let Some(context) = headless_context(QueueRoles::GRAPHICS) else {
        return;
    };
    let device = context.device().unwrap();
    let graphics_family = context.queue_families().unwrap().graphics.unwrap();

    let pool = CommandPool::new(device, graphics_family, vk::CommandPoolCreateFlags::empty()).unwrap();
    let cmd = pool.allocate_primary().unwrap();
    let raw = cmd.raw();
    drop(cmd);

    // Still allocated: the pool frees it exactly once
    let mut buffers = [raw];
    pool.free(&mut buffers).unwrap();
    assert_eq!(buffers[0], vk::CommandBuffer::null());
}
