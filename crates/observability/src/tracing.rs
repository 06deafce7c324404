//! Tracing/logging initialization.
//!
//! Service code logs through `tracing` macros only; which of those events are
//! emitted, and how, is decided here once per process.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info";

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// JSON logs with timestamps, filtered by `RUST_LOG` (default `info`).
pub fn init() {
    init_with_filter(DEFAULT_FILTER);
}

/// Like [`init`], with a caller-chosen fallback filter (e.g. `"kasaku_infra=debug"`).
pub fn init_with_filter(default_directive: &str) {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive))
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(filter = default_directive, "tracing initialised");
    }
}

/// Compact output routed through the test writer so `cargo test` captures it.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("debug"))
        .compact()
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialisation_is_harmless() {
        init_for_tests();
        init();
        init_with_filter("warn");
        tracing::info!("still logging");
    }
}
