//! Telemetry initialization: structured logging via `tracing`.
//!
//! The log level is taken from `RUST_LOG` and defaults to `info`. Repository
//! operations are instrumented with `#[tracing::instrument]`, so turning on
//! `debug` for `swimctl` gives a per-query trace of the admission machine.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the tracing subscriber with console output.
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}
