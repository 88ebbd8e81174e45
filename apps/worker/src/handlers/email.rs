//! Email delivery handler.

use std::time::Duration;

use async_trait::async_trait;
use drudge_queue::{Job, JobHandler, QueueError, QueueResult};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
struct EmailPayload {
    to: String,
    subject: String,
    #[serde(default)]
    body: String,
}

pub struct EmailHandler;

impl EmailHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EmailHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandler for EmailHandler {
    fn job_type(&self) -> &str {
        "email"
    }

    fn description(&self) -> &str {
        "Sends emails to specified recipients"
    }

    async fn handle(&self, job: &Job) -> QueueResult<()> {
        let payload: EmailPayload = serde_json::from_str(job.payload.get())
            .map_err(|e| QueueError::Handler(format!("invalid email payload: {}", e)))?;

        if payload.to.is_empty() {
            return Err(QueueError::Handler(
                "email recipient cannot be empty".to_string(),
            ));
        }
        if payload.subject.is_empty() {
            return Err(QueueError::Handler(
                "email subject cannot be empty".to_string(),
            ));
        }

        info!(
            job_id = %job.id,
            to = %payload.to,
            subject = %payload.subject,
            body_bytes = payload.body.len(),
            "sending email"
        );

        // Stand-in for the provider round trip
        tokio::time::sleep(Duration::from_millis(100)).await;

        info!(job_id = %job.id, to = %payload.to, "email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn email_job(payload: serde_json::Value) -> Job {
        Job::from_payload("email", &payload).unwrap()
    }

    #[tokio::test]
    async fn test_handles_valid_payload() {
        let handler = EmailHandler::new();
        let job = email_job(json!({
            "to": "user@example.com",
            "subject": "hello",
            "body": "world"
        }));

        assert!(handler.handle(&job).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_missing_recipient() {
        let handler = EmailHandler::new();
        let job = email_job(json!({"to": "", "subject": "hello"}));

        let err = handler.handle(&job).await.unwrap_err();
        assert!(err.to_string().contains("recipient"));
    }

    #[tokio::test]
    async fn test_rejects_malformed_payload() {
        let handler = EmailHandler::new();
        let job = email_job(json!({"to": 42}));

        let err = handler.handle(&job).await.unwrap_err();
        assert!(err.to_string().contains("invalid email payload"));
    }
}
