//! Tracing subscriber setup.

use crate::error::{FeedError, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global tracing subscriber with the given filter directive,
/// e.g. `"info"` or `"tideline=debug"`.
pub fn init_logging(level: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|e| FeedError::InvalidArgument(format!("invalid log level: {e}")))?,
        )
        .with_target(true)
        .try_init()
        .map_err(|_| FeedError::InvalidArgument("logging already initialized".into()))
}
