//! Tracing setup.
//!
//! The library only emits `tracing` events. Binaries and tests that want to
//! see them call [`init_tracing`] once.

use anyhow::Result;

/// Install a global `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_level` when the variable is unset or unparsable.
///
/// Returns an error if a global subscriber is already installed.
#[cfg(feature = "telemetry")]
pub fn init_tracing(default_level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_names(true))
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}

#[cfg(not(feature = "telemetry"))]
pub fn init_tracing(_default_level: &str) -> Result<()> {
    Ok(())
}
