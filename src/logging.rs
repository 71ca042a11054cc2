//! Tracing subscriber initialization.

use crate::config::LogFormat;
use crate::error::{RefNetError, RefNetResult};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Call once from each binary's
/// `main()`, before any other crate code runs.
pub fn init(format: LogFormat, filter: &str) -> RefNetResult<()> {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init(),
    };

    result.map_err(|e| RefNetError::Config(format!("failed to initialize logging: {e}")))
}
