//! Tracing/logging initialization.
//!
//! The engine emits structured events on its hot paths: allocation spans,
//! opaque-number fallbacks, burned sequence numbers and immutability
//! violations. Hosts pick the output flavor; filtering stays `RUST_LOG`
//! driven either way.

use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize tracing/logging for the process.
///
/// JSON lines with timestamps, suited for log shipping. Safe to call
/// multiple times (subsequent calls are no-ops).
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

/// Human-readable variant for local development and test runs.
pub fn init_pretty() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .pretty()
        .try_init();
}
