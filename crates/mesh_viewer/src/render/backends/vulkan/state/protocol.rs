//! Swapchain recreation, acquisition and presentation protocol
//!
//! The sequencing is written against [`SwapchainHost`] so it can run over
//! the real device context or a scripted host in tests.

use ash::prelude::VkResult;
use ash::vk;

use super::swapchain::is_zero_area;
use crate::render::backends::vulkan::core::error::{VulkanError, VulkanResult};

/// Attempts per acquire before an out-of-date swapchain becomes an error
pub const MAX_ACQUIRE_ATTEMPTS: usize = 3;

/// Outcome of a recreation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recreation {
    /// The swapchain was rebuilt and dependents notified
    Recreated,
    /// The surface has zero area; nothing was touched
    Suboptimal,
}

/// Steps the protocol needs from a swapchain owner
pub trait SwapchainHost {
    /// Wait for the graphics and presentation queues to drain
    fn wait_queues_idle(&mut self) -> VulkanResult<()>;
    /// Extent from freshly queried surface capabilities
    fn current_extent(&mut self) -> VulkanResult<vk::Extent2D>;
    /// Run swapchain-destroyed callbacks, in reverse registration order
    fn notify_destroyed(&mut self);
    /// Destroy the image views
    fn release_views(&mut self);
    /// Create the new swapchain chained through the old one
    fn rebuild(&mut self, extent: vk::Extent2D) -> VulkanResult<()>;
    /// Run swapchain-created callbacks, in registration order
    fn notify_created(&mut self) -> VulkanResult<()>;
    /// Native acquire; `Ok((index, suboptimal))`
    fn acquire_raw(&mut self, semaphore: vk::Semaphore) -> VkResult<(u32, bool)>;
    /// Native present; `Ok(true)` means suboptimal
    fn present_raw(&mut self, wait: &[vk::Semaphore], index: u32) -> VkResult<bool>;
    /// Destroy the handle retired by the last recreation
    fn destroy_retired(&mut self);
    /// Whether a recreation is scheduled
    fn recreate_pending(&self) -> bool;
    /// Schedule or clear a recreation
    fn set_recreate_pending(&mut self, pending: bool);
}

/// Rebuild the swapchain and its dependents
///
/// A zero-area surface leaves everything in place and reports
/// [`Recreation::Suboptimal`]; the pending flag stays set so the next frame
/// tries again. The flag is also set before anything is torn down and only
/// cleared once dependents are recreated, so a failed rebuild is retried.
pub fn recreate<H: SwapchainHost + ?Sized>(host: &mut H) -> VulkanResult<Recreation> {
    host.wait_queues_idle()?;

    let extent = host.current_extent()?;
    if is_zero_area(extent) {
        log::debug!("[swapchain] Surface has zero area, postponing recreation");
        host.set_recreate_pending(true);
        return Ok(Recreation::Suboptimal);
    }

    host.set_recreate_pending(true);
    host.notify_destroyed();
    host.release_views();
    host.rebuild(extent)?;
    host.notify_created()?;
    host.set_recreate_pending(false);
    Ok(Recreation::Recreated)
}

/// Acquire the next image, recreating on the way when needed
///
/// `Ok(None)` means there is no image this frame (zero-area surface). A
/// suboptimal image is kept, since its semaphore is already pending, and a
/// recreation is scheduled for after present.
pub fn acquire<H: SwapchainHost + ?Sized>(host: &mut H, semaphore: vk::Semaphore) -> VulkanResult<Option<u32>> {
    for _ in 0..MAX_ACQUIRE_ATTEMPTS {
        if host.recreate_pending() && recreate(host)? == Recreation::Suboptimal {
            return Ok(None);
        }

        match host.acquire_raw(semaphore) {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    log::debug!("[swapchain] Acquired suboptimal image {}, recreating after present", index);
                    host.set_recreate_pending(true);
                }
                host.destroy_retired();
                return Ok(Some(index));
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::debug!("[swapchain] Out of date at acquire");
                host.set_recreate_pending(true);
            }
            Err(code) => return Err(VulkanError::native("swapchain", code)),
        }
    }

    Err(VulkanError::validation(
        "swapchain",
        format!("still out of date after {MAX_ACQUIRE_ATTEMPTS} acquire attempts"),
    ))
}

/// Present an image; stale or suboptimal swapchains are recreated and the
/// call still succeeds
pub fn present<H: SwapchainHost + ?Sized>(host: &mut H, wait: &[vk::Semaphore], index: u32) -> VulkanResult<()> {
    let stale = match host.present_raw(wait, index) {
        Ok(suboptimal) => suboptimal || host.recreate_pending(),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR) => true,
        Err(code) => return Err(VulkanError::native("swapchain", code)),
    };

    if stale {
        recreate(host)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted host that tracks image and view counts like a real swapchain
    struct FakeHost {
        extent: vk::Extent2D,
        images: usize,
        views: usize,
        pending: bool,
        retired: bool,
        rebuild_failures: usize,
        events: Vec<&'static str>,
        acquire_script: VecDeque<VkResult<(u32, bool)>>,
        present_script: VecDeque<VkResult<bool>>,
    }

    impl FakeHost {
        fn new() -> Self {
            Self {
                extent: vk::Extent2D { width: 800, height: 600 },
                images: 3,
                views: 3,
                pending: false,
                retired: false,
                rebuild_failures: 0,
                events: Vec::new(),
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
            }
        }
    }

    impl SwapchainHost for FakeHost {
        fn wait_queues_idle(&mut self) -> VulkanResult<()> {
            self.events.push("idle");
            Ok(())
        }

        fn current_extent(&mut self) -> VulkanResult<vk::Extent2D> {
            Ok(self.extent)
        }

        fn notify_destroyed(&mut self) {
            self.events.push("destroyed");
        }

        fn release_views(&mut self) {
            self.views = 0;
            self.images = 0;
        }

        fn rebuild(&mut self, _extent: vk::Extent2D) -> VulkanResult<()> {
            if self.rebuild_failures > 0 {
                self.rebuild_failures -= 1;
                self.events.push("rebuild failed");
                return Err(VulkanError::native("swapchain", vk::Result::ERROR_INITIALIZATION_FAILED));
            }
            self.images = 3;
            self.views = 3;
            self.retired = true;
            self.events.push("rebuild");
            Ok(())
        }

        fn notify_created(&mut self) -> VulkanResult<()> {
            self.events.push("created");
            Ok(())
        }

        fn acquire_raw(&mut self, _semaphore: vk::Semaphore) -> VkResult<(u32, bool)> {
            self.acquire_script.pop_front().unwrap_or(Ok((0, false)))
        }

        fn present_raw(&mut self, _wait: &[vk::Semaphore], _index: u32) -> VkResult<bool> {
            self.events.push("present");
            self.present_script.pop_front().unwrap_or(Ok(false))
        }

        fn destroy_retired(&mut self) {
            self.retired = false;
        }

        fn recreate_pending(&self) -> bool {
            self.pending
        }

        fn set_recreate_pending(&mut self, pending: bool) {
            self.pending = pending;
        }
    }

    #[test]
    fn test_recreate_with_same_extent_runs_each_callback_once() {
        let mut host = FakeHost::new();

        assert_eq!(recreate(&mut host).unwrap(), Recreation::Recreated);
        assert_eq!(host.events, vec!["idle", "destroyed", "rebuild", "created"]);
        assert_eq!(host.images, 3);
        assert_eq!(host.images, host.views);
    }

    #[test]
    fn test_zero_area_has_no_side_effects() {
        let mut host = FakeHost::new();
        host.extent = vk::Extent2D { width: 0, height: 600 };

        assert_eq!(recreate(&mut host).unwrap(), Recreation::Suboptimal);
        assert_eq!(host.events, vec!["idle"]);
        assert_eq!((host.images, host.views), (3, 3));
        assert!(host.pending);

        // No image while minimized
        assert_eq!(acquire(&mut host, vk::Semaphore::null()).unwrap(), None);
    }

    #[test]
    fn test_out_of_date_present_recreates_once_then_succeeds() {
        let mut host = FakeHost::new();
        host.present_script.push_back(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));

        present(&mut host, &[], 0).unwrap();
        assert_eq!(host.events.iter().filter(|e| **e == "rebuild").count(), 1);

        present(&mut host, &[], 1).unwrap();
        assert_eq!(host.events.iter().filter(|e| **e == "rebuild").count(), 1);
        assert_eq!(host.events.last(), Some(&"present"));
        assert!(!host.pending);
    }

    #[test]
    fn test_failed_rebuild_keeps_recreation_pending() {
        let mut host = FakeHost::new();
        host.rebuild_failures = 1;
        host.present_script.push_back(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));

        assert!(present(&mut host, &[], 0).is_err());
        assert!(host.pending);
        assert_eq!((host.images, host.views), (0, 0));

        // The next frame rebuilds before touching the swapchain
        assert_eq!(acquire(&mut host, vk::Semaphore::null()).unwrap(), Some(0));
        assert_eq!(host.events.iter().filter(|e| **e == "rebuild").count(), 1);
        assert_eq!(host.events.last(), Some(&"created"));
        assert_eq!((host.images, host.views), (3, 3));
        assert!(!host.pending);
    }

    #[test]
    fn test_out_of_date_acquire_retries_after_recreation() {
        let mut host = FakeHost::new();
        host.acquire_script.push_back(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
        host.acquire_script.push_back(Ok((2, false)));

        assert_eq!(acquire(&mut host, vk::Semaphore::null()).unwrap(), Some(2));
        assert_eq!(host.events, vec!["idle", "destroyed", "rebuild", "created"]);
        // Retired handle goes away at the first successful acquire
        assert!(!host.retired);
    }

    #[test]
    fn test_suboptimal_acquire_keeps_image_and_recreates_after_present() {
        let mut host = FakeHost::new();
        host.acquire_script.push_back(Ok((1, true)));

        assert_eq!(acquire(&mut host, vk::Semaphore::null()).unwrap(), Some(1));
        assert!(host.pending);
        assert!(host.events.is_empty());

        present(&mut host, &[], 1).unwrap();
        assert_eq!(host.events, vec!["present", "idle", "destroyed", "rebuild", "created"]);
        assert!(!host.pending);
    }

    #[test]
    fn test_persistent_out_of_date_is_bounded() {
        let mut host = FakeHost::new();
        for _ in 0..MAX_ACQUIRE_ATTEMPTS {
            host.acquire_script.push_back(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
        }
        assert!(acquire(&mut host, vk::Semaphore::null()).is_err());
    }

    #[test]
    fn test_device_loss_is_a_hard_failure() {
        let mut host = FakeHost::new();
        host.present_script.push_back(Err(vk::Result::ERROR_DEVICE_LOST));

        let err = present(&mut host, &[], 0).unwrap_err();
        assert!(err.is_unrecoverable());
    }
}
