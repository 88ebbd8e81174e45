//! Broker (Redis) connection configuration.

use std::time::Duration;

use crate::{env_duration, env_or_default, env_parse, ConfigError, FromEnv};

/// Broker connection settings
///
/// Environment variables:
/// - `REDIS_URL` (default `redis://localhost:6379`)
/// - `REDIS_PASSWORD` (optional)
/// - `REDIS_DB` (default 0)
/// - `REDIS_TIMEOUT` (default `5s`)
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    pub url: String,
    pub password: Option<String>,
    pub db: u8,
    pub timeout: Duration,
}

impl BrokerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            password: None,
            db: 0,
            timeout: Duration::from_secs(5),
        }
    }

    /// Build the full connection URL with password and database applied.
    ///
    /// Password and database already present in the URL take precedence.
    pub fn connection_url(&self) -> String {
        let mut url = self.url.clone();

        if let Some(password) = &self.password {
            if !password.is_empty() && !url.contains('@') {
                if let Some(rest) = url.strip_prefix("redis://") {
                    url = format!("redis://:{}@{}", password, rest);
                }
            }
        }

        if self.db != 0 {
            let after_scheme = url.splitn(2, "://").nth(1).unwrap_or("");
            if !after_scheme.contains('/') {
                url = format!("{}/{}", url, self.db);
            }
        }

        url
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self::new("redis://localhost:6379")
    }
}

impl FromEnv for BrokerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let url = env_or_default("REDIS_URL", "redis://localhost:6379");
        let password = std::env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty());
        let db = env_parse("REDIS_DB", 0u8)?;
        let timeout = env_duration("REDIS_TIMEOUT", Duration::from_secs(5))?;

        Ok(Self {
            url,
            password,
            db,
            timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BrokerConfig::default();
        assert_eq!(config.url, "redis://localhost:6379");
        assert_eq!(config.db, 0);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_connection_url_plain() {
        let config = BrokerConfig::new("redis://localhost:6379");
        assert_eq!(config.connection_url(), "redis://localhost:6379");
    }

    #[test]
    fn test_connection_url_with_password_and_db() {
        let mut config = BrokerConfig::new("redis://cache:6379");
        config.password = Some("hunter2".to_string());
        config.db = 3;
        assert_eq!(config.connection_url(), "redis://:hunter2@cache:6379/3");
    }

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [
                ("REDIS_URL", Some("redis://prod:6379")),
                ("REDIS_DB", Some("2")),
                ("REDIS_TIMEOUT", Some("10s")),
            ],
            || {
                let config = BrokerConfig::from_env().unwrap();
                assert_eq!(config.url, "redis://prod:6379");
                assert_eq!(config.db, 2);
                assert_eq!(config.timeout, Duration::from_secs(10));
            },
        );
    }

    #[test]
    fn test_from_env_invalid_db() {
        temp_env::with_var("REDIS_DB", Some("sixteen"), || {
            assert!(BrokerConfig::from_env().is_err());
        });
    }
}
