//! Error types for job lifecycle operations.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the queue layer, registry, worker pool, and limiter.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Malformed submission or invalid job fields. Non-retryable.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Broker unreachable or returned an error. Retryable by the caller,
    /// never converted into a job failure.
    #[error("broker error: {0}")]
    Broker(#[from] redis::RedisError),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Handler not registered, or DLQ id absent on reprocess.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate handler registration. Configuration bug, fatal at startup.
    #[error("handler for type '{0}' already registered")]
    AlreadyRegistered(String),

    /// Failure produced inside a handler. Retryable up to the job's cap.
    #[error("handler error: {0}")]
    Handler(String),

    /// Shutdown exceeded the configured deadline; worker tasks may still
    /// be running.
    #[error("shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),

    /// Admission denied by the rate limiter.
    #[error("rate limited: {0}")]
    RateLimited(String),
}

impl QueueError {
    /// Whether the operation that produced this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Broker(_) | Self::Handler(_) | Self::RateLimited(_)
        )
    }
}

/// Result type alias for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QueueError::Validation("job id cannot be empty".to_string());
        assert_eq!(err.to_string(), "validation failed: job id cannot be empty");

        let err = QueueError::AlreadyRegistered("email".to_string());
        assert_eq!(
            err.to_string(),
            "handler for type 'email' already registered"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(QueueError::Handler("boom".to_string()).is_retryable());
        assert!(QueueError::RateLimited("bulk".to_string()).is_retryable());
        assert!(!QueueError::Validation("bad".to_string()).is_retryable());
        assert!(!QueueError::NotFound("job-1".to_string()).is_retryable());
        assert!(!QueueError::AlreadyRegistered("email".to_string()).is_retryable());
    }

    #[test]
    fn test_serialization_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: QueueError = parse_err.into();
        assert!(matches!(err, QueueError::Serialization(_)));
    }
}
