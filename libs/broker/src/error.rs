use thiserror::Error;

/// Error type for broker connection and probe operations
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Command or protocol failure from the underlying client
    #[error("broker command failed: {0}")]
    Redis(#[from] redis::RedisError),

    /// The broker is reachable but not answering sanely
    #[error("broker unhealthy: {0}")]
    Unhealthy(String),
}

/// Result type alias for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;
