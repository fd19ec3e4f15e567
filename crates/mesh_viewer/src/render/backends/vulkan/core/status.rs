//! Must-check status signal
//!
//! [`Status`] carries the native result of a call that has no payload
//! (submissions, waits, flushes). It is `#[must_use]`, so ignoring a failure
//! is a compiler warning; [`Status::check`] turns it into a
//! [`VulkanResult`] for `?` propagation.
//!
//! Local validation failures share the same channel using [`RESULT_MAX`],
//! a value no driver returns, so they stay distinguishable from native codes.

use std::sync::RwLock;

use ash::vk;

use super::error::{VulkanError, VulkanResult};

/// Sentinel code for failures detected by this crate rather than the driver
pub const RESULT_MAX: vk::Result = vk::Result::from_raw(0x7FFF_FFFF);

type FailureHook = Box<dyn Fn(&str, vk::Result) + Send + Sync>;

static FAILURE_HOOK: RwLock<Option<FailureHook>> = RwLock::new(None);

/// Install a process-wide callback invoked whenever a checked status fails
///
/// The hook receives the component tag and the failing code. It runs before
/// the error is returned, so it can count, log or break into a debugger.
pub fn set_failure_hook(hook: impl Fn(&str, vk::Result) + Send + Sync + 'static) {
    if let Ok(mut slot) = FAILURE_HOOK.write() {
        *slot = Some(Box::new(hook));
    }
}

/// Remove the failure hook
pub fn clear_failure_hook() {
    if let Ok(mut slot) = FAILURE_HOOK.write() {
        *slot = None;
    }
}

fn report_failure(kind: &str, code: vk::Result) {
    if let Ok(slot) = FAILURE_HOOK.read() {
        if let Some(hook) = slot.as_ref() {
            hook(kind, code);
        }
    }
}

/// Status of a native call that returns no payload
#[must_use = "a Status may carry a failure; call check() or inspect it"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(vk::Result);

impl Status {
    /// Successful status
    pub const SUCCESS: Self = Self(vk::Result::SUCCESS);

    /// Wrap a native result code
    pub const fn new(code: vk::Result) -> Self {
        Self(code)
    }

    /// Status for a failure detected locally
    pub const fn local_failure() -> Self {
        Self(RESULT_MAX)
    }

    /// Underlying code
    pub const fn code(self) -> vk::Result {
        self.0
    }

    /// Whether the call succeeded
    pub fn is_success(self) -> bool {
        self.0 == vk::Result::SUCCESS
    }

    /// Convert into a result, invoking the failure hook on error
    pub fn check(self, kind: &'static str) -> VulkanResult<()> {
        if self.is_success() {
            return Ok(());
        }
        report_failure(kind, self.0);
        if self.0 == RESULT_MAX {
            Err(VulkanError::validation(kind, "call rejected before reaching the driver"))
        } else {
            Err(VulkanError::native(kind, self.0))
        }
    }
}

impl From<vk::Result> for Status {
    fn from(code: vk::Result) -> Self {
        Self(code)
    }
}

impl From<Result<(), vk::Result>> for Status {
    fn from(result: Result<(), vk::Result>) -> Self {
        match result {
            Ok(()) => Self::SUCCESS,
            Err(code) => Self(code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_success_checks_ok() {
        assert!(Status::SUCCESS.check("test").is_ok());
        assert!(Status::from(Ok(())).is_success());
    }

    #[test]
    fn test_native_and_local_failures_stay_distinguishable() {
        let native = Status::from(vk::Result::ERROR_DEVICE_LOST).check("device").unwrap_err();
        let local = Status::local_failure().check("device").unwrap_err();

        assert_eq!(native.code(), vk::Result::ERROR_DEVICE_LOST);
        assert_eq!(local.code(), RESULT_MAX);
        assert!(matches!(local, VulkanError::Validation { .. }));
    }

    #[test]
    fn test_failure_hook_sees_failures() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        set_failure_hook(move |kind, code| {
            if kind == "hookCheck" && code == vk::Result::ERROR_OUT_OF_HOST_MEMORY {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let _ = Status::new(vk::Result::ERROR_OUT_OF_HOST_MEMORY).check("hookCheck");
        let _ = Status::SUCCESS.check("hookCheck");
        clear_failure_hook();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
