//! Mathematical computation handler.

use async_trait::async_trait;
use drudge_queue::{Job, JobHandler, QueueError, QueueResult};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
struct MathPayload {
    operation: String,
    number: u64,
}

pub struct MathHandler;

impl MathHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MathHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandler for MathHandler {
    fn job_type(&self) -> &str {
        "math"
    }

    fn description(&self) -> &str {
        "Performs mathematical computations (fibonacci, factorial, prime checking)"
    }

    async fn handle(&self, job: &Job) -> QueueResult<()> {
        let payload: MathPayload = serde_json::from_str(job.payload.get())
            .map_err(|e| QueueError::Handler(format!("invalid math payload: {}", e)))?;

        if payload.operation.is_empty() {
            return Err(QueueError::Handler(
                "math operation cannot be empty".to_string(),
            ));
        }

        let result = match payload.operation.as_str() {
            "fibonacci" => fibonacci(payload.number)
                .ok_or_else(|| QueueError::Handler(format!(
                    "fibonacci({}) overflows",
                    payload.number
                )))?
                .to_string(),
            "factorial" => factorial(payload.number)
                .ok_or_else(|| QueueError::Handler(format!(
                    "factorial({}) overflows",
                    payload.number
                )))?
                .to_string(),
            "is_prime" => is_prime(payload.number).to_string(),
            other => {
                return Err(QueueError::Handler(format!(
                    "unknown math operation '{}'",
                    other
                )))
            }
        };

        info!(
            job_id = %job.id,
            operation = %payload.operation,
            number = payload.number,
            result = %result,
            "math computation finished"
        );
        Ok(())
    }
}

fn fibonacci(n: u64) -> Option<u128> {
    let (mut a, mut b) = (0u128, 1u128);
    for _ in 0..n {
        let next = a.checked_add(b)?;
        a = b;
        b = next;
    }
    Some(a)
}

fn factorial(n: u64) -> Option<u128> {
    let mut result = 1u128;
    for i in 2..=u128::from(n) {
        result = result.checked_mul(i)?;
    }
    Some(result)
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut divisor = 3;
    while divisor <= n / divisor {
        if n % divisor == 0 {
            return false;
        }
        divisor += 2;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn math_job(payload: serde_json::Value) -> Job {
        Job::from_payload("math", &payload).unwrap()
    }

    #[test]
    fn test_fibonacci() {
        assert_eq!(fibonacci(0), Some(0));
        assert_eq!(fibonacci(1), Some(1));
        assert_eq!(fibonacci(10), Some(55));
        assert_eq!(fibonacci(50), Some(12_586_269_025));
        assert!(fibonacci(500).is_none());
    }

    #[test]
    fn test_factorial() {
        assert_eq!(factorial(0), Some(1));
        assert_eq!(factorial(1), Some(1));
        assert_eq!(factorial(10), Some(3_628_800));
        assert!(factorial(100).is_none());
    }

    #[test]
    fn test_is_prime() {
        assert!(!is_prime(0));
        assert!(!is_prime(1));
        assert!(is_prime(2));
        assert!(is_prime(3));
        assert!(!is_prime(9));
        assert!(is_prime(7919));
        assert!(!is_prime(7917));
    }

    #[tokio::test]
    async fn test_handles_valid_operation() {
        let handler = MathHandler::new();
        let job = math_job(json!({"operation": "fibonacci", "number": 10}));
        assert!(handler.handle(&job).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_unknown_operation() {
        let handler = MathHandler::new();
        let job = math_job(json!({"operation": "cube_root", "number": 27}));

        let err = handler.handle(&job).await.unwrap_err();
        assert!(err.to_string().contains("unknown math operation"));
    }

    #[tokio::test]
    async fn test_reports_overflow() {
        let handler = MathHandler::new();
        let job = math_job(json!({"operation": "factorial", "number": 1000}));

        let err = handler.handle(&job).await.unwrap_err();
        assert!(err.to_string().contains("overflows"));
    }
}
