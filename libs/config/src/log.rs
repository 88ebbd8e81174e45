//! Logging configuration.

use crate::{env_or_default, ConfigError, FromEnv};

/// Logging settings
///
/// Environment variables:
/// - `LOG_LEVEL` (default `info`)
/// - `LOG_FORMAT` (`console` or `json`, default `console`)
#[derive(Clone, Debug)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Output format for log lines
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable output for development
    Console,
    /// JSON lines for log aggregation
    Json,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Console,
        }
    }
}

impl FromEnv for LogConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let format = match env_or_default("LOG_FORMAT", "console").as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Console,
        };

        Ok(Self {
            level: env_or_default("LOG_LEVEL", "info"),
            format,
        })
    }
}
