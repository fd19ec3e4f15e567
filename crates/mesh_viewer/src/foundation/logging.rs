//! Logging setup
//!
//! Every diagnostic in the crate goes through the `log` facade with a
//! bracketed component tag (`[swapchain]`, `[deviceMemory]`, ...), so a
//! single `RUST_LOG` filter and a grep are enough to follow one subsystem.

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system
///
/// Defaults to `info` when `RUST_LOG` is unset. Safe to call more than once;
/// later calls are ignored.
pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

/// Initialize logging for tests, capturing output per test
#[cfg(test)]
pub(crate) fn init_for_tests() {
    let _ = env_logger::builder().is_test(true).try_init();
}
