//! Environment-driven configuration for the drudge job platform.
//!
//! Every section is loaded from environment variables through the
//! [`FromEnv`] trait. Durations accept suffixed units (`500ms`, `5s`,
//! `1m`, `2h`).

pub mod broker;
pub mod log;
pub mod server;
pub mod tracing;
pub mod worker;

use std::env;
use std::time::Duration;

use thiserror::Error;

pub use broker::BrokerConfig;
pub use log::LogConfig;
pub use server::ServerConfig;
pub use worker::WorkerSettings;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable '{0}' is required but not set")]
    MissingEnvVar(String),

    #[error("Failed to parse environment variable '{key}': {details}")]
    ParseError { key: String, details: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Trait for configuration that can be loaded from environment variables
pub trait FromEnv: Sized {
    fn from_env() -> Result<Self, ConfigError>;
}

/// Helper to load an environment variable with a default value
pub fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Helper to load a required environment variable
pub fn env_required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Helper to load and parse an environment variable, falling back to a default
pub fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::ParseError {
            key: key.to_string(),
            details: format!("{}", e),
        }),
        Err(_) => Ok(default),
    }
}

/// Parse a duration with a suffixed unit: `300ms`, `10s`, `1m`, `2h`.
///
/// A bare number is treated as seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => raw.split_at(idx),
        None => (raw, "s"),
    };

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{}'", raw))?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        other => Err(format!("unknown duration unit '{}'", other)),
    }
}

/// Helper to load a duration environment variable with a default
pub fn env_duration(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    match env::var(key) {
        Ok(raw) => parse_duration(&raw).map_err(|details| ConfigError::ParseError {
            key: key.to_string(),
            details,
        }),
        Err(_) => Ok(default),
    }
}

/// Top-level configuration aggregating every section
#[derive(Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub broker: BrokerConfig,
    pub worker: WorkerSettings,
    pub log: LogConfig,
}

impl Config {
    /// Validate cross-section constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid(format!(
                "invalid server port: {}",
                self.server.port
            )));
        }
        if self.worker.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "worker concurrency must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl FromEnv for Config {
    fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            server: ServerConfig::from_env()?,
            broker: BrokerConfig::from_env()?,
            worker: WorkerSettings::from_env()?,
            log: LogConfig::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("300ms").unwrap(), Duration::from_millis(300));
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn test_parse_duration_bare_number_is_seconds() {
        assert_eq!(parse_duration("5").unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10parsecs").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_env_or_default_with_value() {
        temp_env::with_var("TEST_VAR", Some("test_value"), || {
            assert_eq!(env_or_default("TEST_VAR", "default"), "test_value");
        });
    }

    #[test]
    fn test_env_or_default_without_value() {
        temp_env::with_var_unset("MISSING_VAR", || {
            assert_eq!(env_or_default("MISSING_VAR", "fallback"), "fallback");
        });
    }

    #[test]
    fn test_env_required_missing() {
        temp_env::with_var_unset("MISSING_REQUIRED", || {
            let err = env_required("MISSING_REQUIRED").unwrap_err();
            assert!(err.to_string().contains("MISSING_REQUIRED"));
        });
    }

    #[test]
    fn test_env_parse_invalid() {
        temp_env::with_var("BAD_NUMBER", Some("not-a-number"), || {
            let result: Result<u32, _> = env_parse("BAD_NUMBER", 7);
            assert!(result.is_err());
        });
    }

    #[test]
    fn test_config_from_env_defaults() {
        temp_env::with_vars_unset(
            [
                "SERVER_HOST",
                "SERVER_PORT",
                "REDIS_URL",
                "WORKER_CONCURRENCY",
                "LOG_LEVEL",
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.server.port, 8080);
                assert_eq!(config.worker.concurrency, 5);
                assert_eq!(config.log.level, "info");
            },
        );
    }

    #[test]
    fn test_config_rejects_zero_concurrency() {
        temp_env::with_var("WORKER_CONCURRENCY", Some("0"), || {
            let result = Config::from_env();
            assert!(result.is_err());
        });
    }
}
