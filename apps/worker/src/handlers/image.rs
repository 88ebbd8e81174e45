//! Image resize handler.

use std::time::Duration;

use async_trait::async_trait;
use drudge_queue::{Job, JobHandler, QueueError, QueueResult};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
struct ImagePayload {
    url: String,
    width: u32,
    height: u32,
    #[serde(default)]
    format: Option<String>,
}

pub struct ImageHandler;

impl ImageHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandler for ImageHandler {
    fn job_type(&self) -> &str {
        "image_resize"
    }

    fn description(&self) -> &str {
        "Resizes images to specified dimensions"
    }

    async fn handle(&self, job: &Job) -> QueueResult<()> {
        let payload: ImagePayload = serde_json::from_str(job.payload.get())
            .map_err(|e| QueueError::Handler(format!("invalid image payload: {}", e)))?;

        if payload.url.is_empty() {
            return Err(QueueError::Handler(
                "image URL cannot be empty".to_string(),
            ));
        }
        if payload.width == 0 || payload.height == 0 {
            return Err(QueueError::Handler(
                "image dimensions must be positive".to_string(),
            ));
        }

        info!(
            job_id = %job.id,
            url = %payload.url,
            width = payload.width,
            height = payload.height,
            format = payload.format.as_deref().unwrap_or("original"),
            "processing image"
        );

        // Stand-in for the fetch-and-resize pipeline
        tokio::time::sleep(Duration::from_millis(200)).await;

        info!(job_id = %job.id, url = %payload.url, "image processed");
        Ok(())
    }
}
