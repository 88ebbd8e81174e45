//! HTTP server configuration.
//!
//! The submission API itself lives outside this workspace; this section
//! defines the host/port contract that layer loads.

use std::time::Duration;

use crate::{env_duration, env_or_default, env_parse, ConfigError, FromEnv};

/// Server settings
///
/// Environment variables:
/// - `SERVER_HOST` (default `localhost`)
/// - `SERVER_PORT` (default 8080)
/// - `SERVER_READ_TIMEOUT` / `SERVER_WRITE_TIMEOUT` (default `10s`)
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl ServerConfig {
    /// Full listen address, `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
        }
    }
}

impl FromEnv for ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_or_default("SERVER_HOST", "localhost"),
            port: env_parse("SERVER_PORT", 8080u16)?,
            read_timeout: env_duration("SERVER_READ_TIMEOUT", Duration::from_secs(10))?,
            write_timeout: env_duration("SERVER_WRITE_TIMEOUT", Duration::from_secs(10))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address() {
        let config = ServerConfig::default();
        assert_eq!(config.address(), "localhost:8080");
    }

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [("SERVER_HOST", Some("0.0.0.0")), ("SERVER_PORT", Some("9090"))],
            || {
                let config = ServerConfig::from_env().unwrap();
                assert_eq!(config.address(), "0.0.0.0:9090");
            },
        );
    }

    #[test]
    fn test_from_env_invalid_port() {
        temp_env::with_var("SERVER_PORT", Some("eighty"), || {
            assert!(ServerConfig::from_env().is_err());
        });
    }
}
