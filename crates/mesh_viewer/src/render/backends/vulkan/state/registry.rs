//! Lifecycle registries for resources rebuilt around swapchain or device
//! recreation
//!
//! Entries are weak: the owner keeps the `Rc`, and an entry whose owner has
//! gone away is skipped and pruned. Create callbacks run in registration
//! order, destroy callbacks in reverse.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use super::swapchain::SwapchainState;
use crate::render::backends::vulkan::core::error::VulkanResult;
use crate::render::backends::vulkan::initialization::device::LogicalDevice;

/// Resource that depends on the swapchain's images or extent
pub trait SwapchainResource {
    /// Build for a new (or recreated) swapchain
    fn on_swapchain_created(&mut self, state: &SwapchainState) -> VulkanResult<()>;

    /// Release everything tied to the outgoing swapchain
    fn on_swapchain_destroyed(&mut self);
}

/// Resource rebuilt across a full device recreation
pub trait DeviceResource {
    /// Build on a new device
    fn on_device_created(&mut self, device: &Arc<LogicalDevice>) -> VulkanResult<()>;

    /// Release everything tied to the outgoing device
    fn on_device_destroyed(&mut self);
}

/// Ordered weak registry of lifecycle participants
pub struct LifecycleRegistry<T: ?Sized> {
    entries: Vec<Weak<RefCell<T>>>,
}

impl<T: ?Sized> LifecycleRegistry<T> {
    /// Empty registry
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Append a participant
    pub fn register(&mut self, resource: &Rc<RefCell<T>>) {
        self.entries.push(Rc::downgrade(resource));
    }

    /// Number of participants still alive
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|entry| entry.strong_count() > 0).count()
    }

    /// Whether no participant is alive
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(&mut self) {
        self.entries.retain(|entry| entry.strong_count() > 0);
    }

    /// Call `f` on each live participant in registration order
    ///
    /// Stops at the first failure.
    pub fn for_each_forward<F>(&mut self, mut f: F) -> VulkanResult<()>
    where
        F: FnMut(&mut T) -> VulkanResult<()>,
    {
        self.prune();
        for entry in &self.entries {
            if let Some(resource) = entry.upgrade() {
                f(&mut *resource.borrow_mut())?;
            }
        }
        Ok(())
    }

    /// Call `f` on each live participant in reverse registration order
    pub fn for_each_reverse<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut T),
    {
        self.prune();
        for entry in self.entries.iter().rev() {
            if let Some(resource) = entry.upgrade() {
                f(&mut *resource.borrow_mut());
            }
        }
    }

    /// Forget every participant
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T: ?Sized> Default for LifecycleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> std::fmt::Debug for LifecycleRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleRegistry").field("live", &self.len()).finish()
    }
}

/// Notify swapchain participants of a new swapchain
pub fn notify_swapchain_created(
    registry: &mut LifecycleRegistry<dyn SwapchainResource>,
    state: &SwapchainState,
) -> VulkanResult<()> {
    registry.for_each_forward(|resource| resource.on_swapchain_created(state))
}

/// Notify swapchain participants that the swapchain is going away
pub fn notify_swapchain_destroyed(registry: &mut LifecycleRegistry<dyn SwapchainResource>) {
    registry.for_each_reverse(|resource| resource.on_swapchain_destroyed());
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    struct Recorder {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl SwapchainResource for Recorder {
        fn on_swapchain_created(&mut self, state: &SwapchainState) -> VulkanResult<()> {
            self.log
                .borrow_mut()
                .push(format!("create {} {}", self.name, state.image_count));
            Ok(())
        }

        fn on_swapchain_destroyed(&mut self) {
            self.log.borrow_mut().push(format!("destroy {}", self.name));
        }
    }

    fn state() -> SwapchainState {
        SwapchainState {
            format: vk::Format::B8G8R8A8_UNORM,
            extent: vk::Extent2D { width: 4, height: 4 },
            image_count: 3,
            image_views: Vec::new(),
        }
    }

    fn recorder(name: &'static str, log: &Rc<RefCell<Vec<String>>>) -> Rc<RefCell<dyn SwapchainResource>> {
        Rc::new(RefCell::new(Recorder {
            name,
            log: Rc::clone(log),
        }))
    }

    #[test]
    fn test_create_forward_destroy_reverse() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let first = recorder("targets", &log);
        let second = recorder("pipelines", &log);

        let mut registry: LifecycleRegistry<dyn SwapchainResource> = LifecycleRegistry::new();
        registry.register(&first);
        registry.register(&second);

        notify_swapchain_destroyed(&mut registry);
        notify_swapchain_created(&mut registry, &state()).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                "destroy pipelines".to_string(),
                "destroy targets".to_string(),
                "create targets 3".to_string(),
                "create pipelines 3".to_string(),
            ]
        );
    }

    #[test]
    fn test_dropped_participants_are_skipped() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let kept = recorder("kept", &log);
        let dropped = recorder("dropped", &log);

        let mut registry: LifecycleRegistry<dyn SwapchainResource> = LifecycleRegistry::new();
        registry.register(&dropped);
        registry.register(&kept);
        drop(dropped);

        assert_eq!(registry.len(), 1);
        notify_swapchain_destroyed(&mut registry);
        assert_eq!(*log.borrow(), vec!["destroy kept".to_string()]);
    }
}
