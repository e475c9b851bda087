//! Tracing subscriber setup for binaries embedding setkit

use setkit_core::{ConfigError, Result};
use tracing_subscriber::EnvFilter;

/// Filter used when neither the caller nor `RUST_LOG` supplies one
pub const DEFAULT_FILTER: &str = "setkit=debug,info";

/// Build the filter from `directives`, falling back to `RUST_LOG` and then
/// [`DEFAULT_FILTER`]
pub fn env_filter(directives: Option<&str>) -> Result<EnvFilter> {
    match directives {
        Some(directives) => EnvFilter::try_new(directives)
            .map_err(|e| ConfigError::Invalid(format!("log filter: {}", e)).into()),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

/// Install a global fmt subscriber. Fails if one is already installed.
pub fn init(directives: Option<&str>) -> Result<()> {
    let filter = env_filter(directives)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| ConfigError::Invalid(format!("log subscriber: {}", e)))?;

    tracing::info!("setkit logging initialized");
    Ok(())
}
