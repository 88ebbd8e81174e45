//! Worker pool configuration.

use std::time::Duration;

use crate::{env_duration, env_parse, ConfigError, FromEnv};

/// Worker pool settings
///
/// Environment variables:
/// - `WORKER_CONCURRENCY` (default 5)
/// - `WORKER_POLL_INTERVAL` (default `1s`)
/// - `WORKER_MAX_RETRIES` (default 3)
/// - `WORKER_SHUTDOWN_TIMEOUT` (default `30s`)
#[derive(Clone, Debug)]
pub struct WorkerSettings {
    pub concurrency: usize,
    pub poll_interval: Duration,
    pub max_retries: u32,
    pub shutdown_timeout: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval: Duration::from_secs(1),
            max_retries: 3,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl FromEnv for WorkerSettings {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            concurrency: env_parse("WORKER_CONCURRENCY", 5usize)?,
            poll_interval: env_duration("WORKER_POLL_INTERVAL", Duration::from_secs(1))?,
            max_retries: env_parse("WORKER_MAX_RETRIES", 3u32)?,
            shutdown_timeout: env_duration("WORKER_SHUTDOWN_TIMEOUT", Duration::from_secs(30))?,
        })
    }
}
