//! Tracing subscriber setup for binaries embedding identity-service.

use crate::config::{LogFormat, LogSettings};
use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber described by `settings`.
///
/// Fails if the filter does not parse or a global subscriber is already set.
pub fn init_tracing(settings: &LogSettings) -> Result<()> {
    let filter = EnvFilter::try_new(&settings.filter)
        .with_context(|| format!("Invalid log filter: {}", settings.filter))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = match settings.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };

    installed.map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}
