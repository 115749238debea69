//! Logging setup
//!
//! The stages log through `tracing`; this module installs a formatting
//! subscriber for binaries and tests that do not bring their own.

use crate::config::LoggingConfig;
use livetx_core::{TranscodeError, TranscodeResult};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber
///
/// `RUST_LOG` takes precedence over [`LoggingConfig::level`]. Returns
/// `false` if a subscriber was already installed, which is not an error.
pub fn init(config: &LoggingConfig) -> TranscodeResult<bool> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| TranscodeError::InvalidConfiguration {
            message: format!("Invalid log filter '{}': {}", config.level, e),
        })?,
    };

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_thread_names(config.thread_names)
        .with_target(config.target)
        .try_init()
        .is_ok();

    if installed {
        debug!(level = %config.level, "Logging initialized");
    }
    Ok(installed)
}
