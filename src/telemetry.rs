//! Logging setup.
//!
//! Structured logs go to stderr through `tracing-subscriber` so they never
//! mix with the JSON report on stdout. `RUST_LOG` wins over the default
//! level when set.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Initialize the global subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber was already installed.
pub fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .try_init()
        .context("failed to init tracing subscriber")
}
