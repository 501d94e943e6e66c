//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{Result, VertebraError};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter:
///
/// ```bash
/// RUST_LOG=vertebra=debug
/// RUST_LOG=vertebra::protocol=trace,info
/// ```
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| VertebraError::Config(format!("Invalid log filter: {e}")))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| VertebraError::Config(format!("Failed to install subscriber: {e}")))
}
