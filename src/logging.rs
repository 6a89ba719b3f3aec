//! Logging initialization helper.
//!
//! The engine only emits `tracing` events; it never installs a subscriber of
//! its own. Embedders that want console output without wiring up
//! `tracing-subscriber` themselves can call [`init_logging`], configurable
//! via the `RUST_LOG` environment variable (defaults to `info`).

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initializes a stdout `tracing` subscriber with env-filter support.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .try_init()?;

    Ok(())
}
