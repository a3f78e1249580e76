//! Tracing initialization
//!
//! Diagnostics go to stderr so they never mix with records written to stdout.

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, ServiceConfig};
use crate::error::{Error, Result};

/// Install the global subscriber
///
/// `RUST_LOG` wins over `log_level`; an unparsable directive falls back to `info`.
pub fn init_tracing(config: &ServiceConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| level_filter(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter);

    let installed = match config.log_format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
    installed
        .map_err(|e| Error::Configuration(format!("cannot install tracing subscriber: {}", e)))?;

    tracing::info!("Tracing initialized for service: {}", config.name);

    Ok(())
}

fn level_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"))
}
