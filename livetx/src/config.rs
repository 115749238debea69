//! Configuration types and defaults

use livetx_core::{TranscodeError, TranscodeResult};
use livetx_media::{DecoderConfig, FilterConfig};
use serde::{Deserialize, Serialize};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
    /// Colored output
    pub ansi: bool,
    /// Include the thread name, which carries the track id for workers
    pub thread_names: bool,
    /// Include the module target
    pub target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
            thread_names: true,
            target: false,
        }
    }
}

/// Per-track pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Decode stage settings
    pub decoder: DecoderConfig,
    /// Filter stage settings
    pub filter: FilterConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    /// Parse a configuration from JSON, filling missing fields with defaults
    ///
    /// # Example
    /// ```rust
    /// use livetx::PipelineConfig;
    ///
    /// let config = PipelineConfig::from_json_str(r#"{"filter": {"stop_timeout_ms": 250}}"#)?;
    /// assert_eq!(config.filter.stop_timeout_ms, 250);
    /// assert_eq!(config.decoder.queue_capacity, 256);
    /// # Ok::<(), livetx::TranscodeError>(())
    /// ```
    pub fn from_json_str(json: &str) -> TranscodeResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| TranscodeError::InvalidConfiguration {
            message: format!("Failed to parse pipeline config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the settings can be used
    pub fn validate(&self) -> TranscodeResult<()> {
        if self.decoder.queue_capacity == 0 {
            return Err(invalid("decoder.queue_capacity must be greater than 0"));
        }
        if self.decoder.thread_name_prefix.is_empty() {
            return Err(invalid("decoder.thread_name_prefix must not be empty"));
        }
        if self.filter.engine_queue_capacity == 0 {
            return Err(invalid("filter.engine_queue_capacity must be greater than 0"));
        }
        if self.filter.timestamp_jump_limit_secs <= 0 {
            return Err(invalid("filter.timestamp_jump_limit_secs must be positive"));
        }
        if self.filter.stop_timeout_ms == 0 {
            return Err(invalid("filter.stop_timeout_ms must be greater than 0"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> TranscodeError {
    TranscodeError::InvalidConfiguration {
        message: message.to_string(),
    }
}
