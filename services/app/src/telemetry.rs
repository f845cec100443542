//! Tracing initialization
//!
//! Installed once by the process entry point; components only emit spans
//! and events.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber, reading `RUST_LOG` for the filter.
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
