//! Logging initialization
//!
//! All binaries log through `tracing`. The subscriber honours `RUST_LOG` when set and
//! otherwise falls back to the level from the TOML `[logging]` section.

use crate::config::LoggingConfig;
use crate::{Error, Result};
use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Install the global tracing subscriber.
///
/// Returns an error if a global subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}
