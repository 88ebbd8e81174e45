//! The submission contract consumed by the HTTP and CLI layers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use strum::{AsRefStr, Display};
use tracing::debug;

use crate::error::QueueResult;
use crate::job::{Job, Priority};
use crate::queue::Queue;
use crate::scheduled::ScheduledQueue;

/// A job submission as received from a producer.
#[derive(Debug, Deserialize)]
pub struct JobRequest {
    #[serde(rename = "type")]
    pub job_type: String,

    pub payload: Box<RawValue>,

    #[serde(default)]
    pub max_retries: Option<u32>,

    #[serde(default)]
    pub priority: Option<Priority>,

    /// Absolute execution time; routes the job to the scheduled set.
    #[serde(default)]
    pub execute_at: Option<DateTime<Utc>>,

    /// Cron expression for a recurring job. Wins over `execute_at` when
    /// both are present.
    #[serde(default)]
    pub recurring: Option<String>,
}

/// Initial status reported back to the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubmitStatus {
    Pending,
    Scheduled,
}

/// Acknowledgement returned to the producer.
#[derive(Debug, Clone, Serialize)]
pub struct JobResponse {
    pub job_id: String,
    pub status: SubmitStatus,
    pub created_at: DateTime<Utc>,
}

/// Routes accepted submissions into the main queue or the scheduled set.
pub struct JobSubmitter {
    queue: Arc<dyn Queue>,
    scheduled: Arc<ScheduledQueue>,
    default_max_retries: u32,
}

impl JobSubmitter {
    pub fn new(
        queue: Arc<dyn Queue>,
        scheduled: Arc<ScheduledQueue>,
        default_max_retries: u32,
    ) -> Self {
        Self {
            queue,
            scheduled,
            default_max_retries,
        }
    }

    /// Build a job from the request and route it. The producer is never
    /// blocked on handler latency; this returns as soon as the broker
    /// accepted the job.
    pub async fn submit(&self, request: JobRequest) -> QueueResult<JobResponse> {
        let mut job = Job::new(request.job_type, request.payload)
            .with_max_retries(request.max_retries.unwrap_or(self.default_max_retries));
        if let Some(priority) = request.priority {
            job = job.with_priority(priority);
        }
        job.validate()?;

        let status = if let Some(expr) = request.recurring.as_deref() {
            self.scheduled.schedule_recurring(&job, expr).await?;
            SubmitStatus::Scheduled
        } else if let Some(execute_at) = request.execute_at {
            self.scheduled.schedule(&job, execute_at).await?;
            SubmitStatus::Scheduled
        } else {
            self.queue.enqueue(&job).await?;
            SubmitStatus::Pending
        };

        debug!(job_id = %job.id, status = %status, "accepted job submission");

        Ok(JobResponse {
            job_id: job.id,
            status,
            created_at: job.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let raw = r#"{
            "type": "email",
            "payload": {"to": "user@example.com"},
            "max_retries": 3,
            "priority": "high",
            "execute_at": "2030-01-01T00:00:00Z"
        }"#;

        let request: JobRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(request.job_type, "email");
        assert_eq!(request.max_retries, Some(3));
        assert_eq!(request.priority, Some(Priority::High));
        assert!(request.execute_at.is_some());
        assert!(request.recurring.is_none());
    }

    #[test]
    fn test_request_minimal_fields() {
        let raw = r#"{"type": "math", "payload": {"n": 9}}"#;
        let request: JobRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(request.job_type, "math");
        assert!(request.max_retries.is_none());
        assert!(request.priority.is_none());
    }

    #[test]
    fn test_submit_status_wire_values() {
        assert_eq!(SubmitStatus::Pending.to_string(), "pending");
        assert_eq!(SubmitStatus::Scheduled.to_string(), "scheduled");
        assert_eq!(
            serde_json::to_string(&SubmitStatus::Scheduled).unwrap(),
            "\"scheduled\""
        );
    }

    #[test]
    fn test_response_serializes_contract_fields() {
        let response = JobResponse {
            job_id: "job-1".to_string(),
            status: SubmitStatus::Pending,
            created_at: Utc::now(),
        };
        let value: serde_json::Value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["job_id"], "job-1");
        assert_eq!(value["status"], "pending");
        assert!(value.get("created_at").is_some());
    }
}
