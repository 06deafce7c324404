//! Process-wide tracing setup shared by every Kasaku binary and test suite.

/// Tracing subscriber configuration.
pub mod tracing;

pub use crate::tracing::{DEFAULT_FILTER, init_with_filter};

/// Initialize structured logging for the process (JSON, `RUST_LOG`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    crate::tracing::init();
}

/// Human-readable logging captured by the test harness.
pub fn init_for_tests() {
    crate::tracing::init_for_tests();
}
