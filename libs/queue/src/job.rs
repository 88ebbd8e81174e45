//! The job model and its wire representations.
//!
//! Field names are contractual so producers, workers, and the
//! administrative tooling interoperate through the broker:
//! `id, type, payload, attempts, max_retries, created_at, updated_at,
//! metadata` for a job; `job, execute_at, recurring, cron_expression`
//! for a scheduled entry; `job, error, failed_at` for a DLQ entry.
//! Timestamps are RFC 3339 UTC.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::error::{QueueError, QueueResult};

/// Dispatch priority of a job.
///
/// Carried in job metadata; absent or malformed values decode as
/// `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(Display, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// All priorities in descending dispatch order.
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Low];
}

/// Lifecycle stage of a job as observable by a producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Retrying,
}

/// Typed job metadata: a required priority plus an opaque extension map
/// for forward compatibility.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    #[serde(default, deserialize_with = "lenient_priority")]
    pub priority: Priority,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl JobMetadata {
    pub fn with_priority(priority: Priority) -> Self {
        Self {
            priority,
            extra: HashMap::new(),
        }
    }
}

/// Malformed priority values decode as the default rather than failing
/// the whole job.
fn lenient_priority<'de, D>(deserializer: D) -> Result<Priority, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default())
}

/// A unit of work.
///
/// The payload is opaque raw JSON: the queue layer moves it byte-for-byte
/// and only the matching handler interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,

    #[serde(rename = "type")]
    pub job_type: String,

    pub payload: Box<RawValue>,

    pub attempts: u32,

    pub max_retries: u32,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JobMetadata>,
}

impl Job {
    /// Create a job with a fresh prefixed id and current timestamps.
    pub fn new(job_type: impl Into<String>, payload: Box<RawValue>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("job-{}", Uuid::new_v4()),
            job_type: job_type.into(),
            payload,
            attempts: 0,
            max_retries: 0,
            created_at: now,
            updated_at: now,
            metadata: None,
        }
    }

    /// Create a job from a serializable payload.
    pub fn from_payload<T: Serialize>(job_type: impl Into<String>, payload: &T) -> QueueResult<Self> {
        let raw = serde_json::value::to_raw_value(payload)?;
        Ok(Self::new(job_type, raw))
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        match &mut self.metadata {
            Some(metadata) => metadata.priority = priority,
            None => self.metadata = Some(JobMetadata::with_priority(priority)),
        }
        self
    }

    /// Attach a metadata extension value.
    pub fn add_metadata(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.metadata
            .get_or_insert_with(JobMetadata::default)
            .extra
            .insert(key.into(), value);
    }

    /// Dispatch priority, defaulting to normal when metadata is absent.
    pub fn priority(&self) -> Priority {
        self.metadata.as_ref().map(|m| m.priority).unwrap_or_default()
    }

    /// Check the invariants every accepted job must hold.
    pub fn validate(&self) -> QueueResult<()> {
        if self.id.is_empty() {
            return Err(QueueError::Validation("job id cannot be empty".to_string()));
        }
        if self.job_type.is_empty() {
            return Err(QueueError::Validation(
                "job type cannot be empty".to_string(),
            ));
        }
        let payload = self.payload.get().trim();
        if payload.is_empty() || payload == "null" {
            return Err(QueueError::Validation(
                "job payload cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Count a new attempt and touch the update timestamp. Called by the
    /// worker immediately before dispatch so a crash mid-dispatch still
    /// counts.
    pub fn increment_attempts(&mut self) {
        self.attempts += 1;
        self.updated_at = Utc::now();
    }

    /// Whether another attempt is allowed after a failure.
    pub fn should_retry(&self) -> bool {
        self.attempts < self.max_retries
    }

    /// Clone for the next recurring occurrence: new id, attempt counter
    /// reset, fresh timestamps.
    pub fn clone_for_next_run(&self) -> Self {
        let now = Utc::now();
        Self {
            id: format!("job-{}", Uuid::new_v4()),
            job_type: self.job_type.clone(),
            payload: self.payload.clone(),
            attempts: 0,
            max_retries: self.max_retries,
            created_at: now,
            updated_at: now,
            metadata: self.metadata.clone(),
        }
    }
}

/// Outcome of a single handler invocation. Not persisted; drives the
/// worker's retry/DLQ decision.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub job_id: String,
    pub status: JobStatus,
    pub error: Option<String>,
    pub duration: Duration,
    pub completed_at: DateTime<Utc>,
}

impl JobResult {
    pub fn completed(job_id: impl Into<String>, duration: Duration) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Completed,
            error: None,
            duration,
            completed_at: Utc::now(),
        }
    }

    pub fn failed(job_id: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Failed,
            error: Some(error.into()),
            duration,
            completed_at: Utc::now(),
        }
    }
}

/// A job waiting for a future execution time in the scheduled set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub job: Job,

    pub execute_at: DateTime<Utc>,

    pub recurring: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_expression: Option<String>,
}

/// A job that exhausted its retries, as stored in the dead-letter list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedJobInfo {
    pub job: Job,

    pub error: String,

    pub failed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_job() -> Job {
        Job::from_payload("email", &json!({"to": "user@example.com"})).unwrap()
    }

    #[test]
    fn test_new_job_defaults() {
        let job = test_job();
        assert!(job.id.starts_with("job-"));
        assert_eq!(job.job_type, "email");
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_retries, 0);
        assert_eq!(job.priority(), Priority::Normal);
        assert!(job.updated_at >= job.created_at);
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let mut job = test_job();
        job.id = String::new();
        assert!(matches!(job.validate(), Err(QueueError::Validation(_))));

        let mut job = test_job();
        job.job_type = String::new();
        assert!(matches!(job.validate(), Err(QueueError::Validation(_))));

        let mut job = test_job();
        job.payload = serde_json::value::to_raw_value(&serde_json::Value::Null).unwrap();
        assert!(matches!(job.validate(), Err(QueueError::Validation(_))));
    }

    #[test]
    fn test_priority_from_metadata() {
        let job = test_job().with_priority(Priority::High);
        assert_eq!(job.priority(), Priority::High);
    }

    #[test]
    fn test_wire_field_names() {
        let job = test_job().with_priority(Priority::Low);
        let value: serde_json::Value = serde_json::to_value(&job).unwrap();

        assert!(value.get("id").is_some());
        assert!(value.get("type").is_some());
        assert!(value.get("payload").is_some());
        assert!(value.get("attempts").is_some());
        assert!(value.get("max_retries").is_some());
        assert!(value.get("created_at").is_some());
        assert!(value.get("updated_at").is_some());
        assert_eq!(value["metadata"]["priority"], "low");
    }

    #[test]
    fn test_metadata_omitted_when_absent() {
        let value: serde_json::Value = serde_json::to_value(test_job()).unwrap();
        assert!(value.get("metadata").is_none());
    }

    #[test]
    fn test_round_trip_is_byte_stable() {
        let job = test_job().with_priority(Priority::High).with_max_retries(3);
        let first = serde_json::to_string(&job).unwrap();
        let reparsed: Job = serde_json::from_str(&first).unwrap();
        let second = serde_json::to_string(&reparsed).unwrap();

        assert_eq!(first, second);
        assert_eq!(reparsed.attempts, job.attempts);
        assert_eq!(reparsed.payload.get(), job.payload.get());
    }

    #[test]
    fn test_malformed_priority_defaults_to_normal() {
        let raw = r#"{"id":"job-1","type":"email","payload":{"x":1},"attempts":0,
            "max_retries":0,"created_at":"2024-01-01T00:00:00Z",
            "updated_at":"2024-01-01T00:00:00Z","metadata":{"priority":"urgent"}}"#;
        let job: Job = serde_json::from_str(raw).unwrap();
        assert_eq!(job.priority(), Priority::Normal);

        let raw = raw.replace("\"urgent\"", "42");
        let job: Job = serde_json::from_str(&raw).unwrap();
        assert_eq!(job.priority(), Priority::Normal);
    }

    #[test]
    fn test_metadata_extra_fields_survive() {
        let mut job = test_job();
        job.add_metadata("tenant", json!("acme"));

        let encoded = serde_json::to_string(&job).unwrap();
        let decoded: Job = serde_json::from_str(&encoded).unwrap();
        assert_eq!(
            decoded.metadata.unwrap().extra.get("tenant"),
            Some(&json!("acme"))
        );
    }

    #[test]
    fn test_increment_attempts_touches_update_time() {
        let mut job = test_job();
        let before = job.updated_at;
        job.increment_attempts();
        assert_eq!(job.attempts, 1);
        assert!(job.updated_at >= before);
    }

    #[test]
    fn test_should_retry_boundary() {
        let mut job = test_job().with_max_retries(2);
        job.attempts = 1;
        assert!(job.should_retry());
        job.attempts = 2;
        assert!(!job.should_retry());

        let zero_retry = test_job();
        assert!(!zero_retry.should_retry());
    }

    #[test]
    fn test_clone_for_next_run_resets_identity() {
        let mut job = test_job().with_max_retries(5).with_priority(Priority::High);
        job.attempts = 3;

        let next = job.clone_for_next_run();
        assert_ne!(next.id, job.id);
        assert_eq!(next.attempts, 0);
        assert_eq!(next.max_retries, 5);
        assert_eq!(next.priority(), Priority::High);
        assert_eq!(next.payload.get(), job.payload.get());
    }

    #[test]
    fn test_priority_wire_values() {
        assert_eq!(Priority::High.to_string(), "high");
        assert_eq!("low".parse::<Priority>().unwrap(), Priority::Low);
        assert_eq!(JobStatus::Pending.to_string(), "pending");
        assert_eq!(JobStatus::Retrying.as_ref(), "retrying");
    }

    #[test]
    fn test_job_result_constructors() {
        let ok = JobResult::completed("job-1", Duration::from_millis(5));
        assert_eq!(ok.status, JobStatus::Completed);
        assert!(ok.error.is_none());

        let failed = JobResult::failed("job-2", "boom", Duration::from_millis(5));
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_scheduled_job_wire_shape() {
        let wrapper = ScheduledJob {
            job: test_job(),
            execute_at: Utc::now(),
            recurring: true,
            cron_expression: Some("*/5 * * * *".to_string()),
        };
        let value: serde_json::Value = serde_json::to_value(&wrapper).unwrap();
        assert!(value.get("job").is_some());
        assert!(value.get("execute_at").is_some());
        assert_eq!(value["recurring"], true);
        assert_eq!(value["cron_expression"], "*/5 * * * *");
    }

    #[test]
    fn test_failed_job_info_wire_shape() {
        let info = FailedJobInfo {
            job: test_job(),
            error: "E".to_string(),
            failed_at: Utc::now(),
        };
        let value: serde_json::Value = serde_json::to_value(&info).unwrap();
        assert!(value.get("job").is_some());
        assert_eq!(value["error"], "E");
        assert!(value.get("failed_at").is_some());
    }
}
