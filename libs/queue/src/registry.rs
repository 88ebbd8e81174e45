//! Handler registry: maps job types to executors and drives dispatch.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use tracing::{error, info};

use crate::error::{QueueError, QueueResult};
use crate::job::{Job, JobResult};

/// An executor for one job type.
///
/// Handlers are registered once at startup and invoked concurrently by
/// the worker pool. Cancellation is delivered by dropping the returned
/// future; handlers doing long work should keep their await points
/// frequent so they stop promptly.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The type tag this handler executes.
    fn job_type(&self) -> &str;

    /// Human-readable description, shown by the administrative tooling.
    fn description(&self) -> &str;

    /// Execute one job. An `Err` counts as a failed attempt and feeds the
    /// retry/DLQ machinery.
    async fn handle(&self, job: &Job) -> QueueResult<()>;
}

/// Concurrent type-tag → handler mapping.
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler. Re-registration of a type is a configuration
    /// bug and is rejected.
    pub fn register(&self, handler: Arc<dyn JobHandler>) -> QueueResult<()> {
        let job_type = handler.job_type().to_string();
        if job_type.is_empty() {
            return Err(QueueError::Validation(
                "handler type cannot be empty".to_string(),
            ));
        }

        let mut handlers = self.handlers.write().unwrap();
        if handlers.contains_key(&job_type) {
            return Err(QueueError::AlreadyRegistered(job_type));
        }

        info!(
            job_type = %job_type,
            description = %handler.description(),
            "registered job handler"
        );
        handlers.insert(job_type, handler);
        Ok(())
    }

    /// Look up the handler for a job type.
    pub fn get(&self, job_type: &str) -> QueueResult<Arc<dyn JobHandler>> {
        self.handlers
            .read()
            .unwrap()
            .get(job_type)
            .cloned()
            .ok_or_else(|| {
                QueueError::NotFound(format!(
                    "no handler registered for job type '{}'",
                    job_type
                ))
            })
    }

    /// All registered type tags.
    pub fn job_types(&self) -> Vec<String> {
        self.handlers.read().unwrap().keys().cloned().collect()
    }

    /// Snapshot of type → description.
    pub fn list_handlers(&self) -> HashMap<String, String> {
        self.handlers
            .read()
            .unwrap()
            .iter()
            .map(|(job_type, handler)| (job_type.clone(), handler.description().to_string()))
            .collect()
    }

    /// Execute a job through its handler, timing the run from the
    /// caller-supplied start instant.
    ///
    /// A missing handler produces a failed result rather than an error;
    /// handler panics are not caught here and unwind to the worker, which
    /// converts them into failed results.
    pub async fn process(&self, job: &Job, started: Instant) -> JobResult {
        let handler = match self.get(&job.job_type) {
            Ok(handler) => handler,
            Err(e) => {
                error!(job_id = %job.id, job_type = %job.job_type, error = %e, "no handler for job");
                return JobResult::failed(job.id.clone(), e.to_string(), started.elapsed());
            }
        };

        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = job.attempts,
            "processing job"
        );

        match handler.handle(job).await {
            Ok(()) => {
                info!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "job completed"
                );
                JobResult::completed(job.id.clone(), started.elapsed())
            }
            Err(e) => {
                error!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    error = %e,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "job processing failed"
                );
                JobResult::failed(job.id.clone(), e.to_string(), started.elapsed())
            }
        }
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
