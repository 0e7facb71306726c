//! Development-time tracing for debugging generation runs.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`; result
//! artifacts (success/fail records, completed-task logs) are product
//! output, written unconditionally and unaffected by this module.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn` if unset.
///
/// # Example
/// ```bash
/// RUST_LOG=datagen=debug datagen --directory tasks --log_file done.log
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
