//! A single cooperative worker task.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::dlq::DeadLetterQueue;
use crate::job::{Job, JobStatus};
use crate::limiter::RateLimiter;
use crate::queue::Queue;
use crate::registry::HandlerRegistry;
use crate::scheduled::ScheduledQueue;

/// Upper bound on one dequeue iteration, broker round trips included.
const DEQUEUE_CYCLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Retries schedule no further out than this.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

/// Backoff before the next try of a job that has failed `attempts` times:
/// `2^(attempts-1)` seconds, capped at five minutes.
pub(crate) fn retry_backoff(attempts: u32) -> Duration {
    let exponent = attempts.saturating_sub(1).min(16);
    Duration::from_secs(1u64 << exponent).min(MAX_RETRY_DELAY)
}

/// Per-worker counters, read by the pool aggregator without blocking the
/// worker.
#[derive(Debug, Default)]
pub struct WorkerCounters {
    pub processed: AtomicU64,
    pub failed: AtomicU64,
    pub retried: AtomicU64,
    pub active: AtomicBool,
}

/// Point-in-time statistics for a single worker.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub worker_id: String,
    pub jobs_processed: u64,
    pub jobs_failed: u64,
    pub jobs_retried: u64,
    pub is_active: bool,
}

pub(crate) struct Worker {
    pub(crate) id: String,
    pub(crate) poll_interval: Duration,
    pub(crate) job_timeout: Duration,
    pub(crate) queue: Arc<dyn Queue>,
    pub(crate) scheduled: Arc<ScheduledQueue>,
    pub(crate) dlq: Arc<DeadLetterQueue>,
    pub(crate) registry: Arc<HandlerRegistry>,
    pub(crate) limiter: Arc<dyn RateLimiter>,
    pub(crate) counters: Arc<WorkerCounters>,
}

impl Worker {
    /// Main processing loop: dequeue, admit, dispatch, record outcome.
    /// Runs until the shutdown channel flips.
    pub(crate) async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(worker_id = %self.id, "worker starting");
        self.counters.active.store(true, Ordering::SeqCst);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                outcome = tokio::time::timeout(DEQUEUE_CYCLE_TIMEOUT, self.queue.dequeue()) => {
                    match outcome {
                        Ok(Ok(Some(job))) => self.handle_job(job, &mut shutdown).await,
                        Ok(Ok(None)) => self.idle_sleep(&mut shutdown).await,
                        Ok(Err(e)) => {
                            // Broker trouble: the job (if any) stays queued;
                            // back off one poll interval and try again.
                            error!(worker_id = %self.id, error = %e, "dequeue failed");
                            self.idle_sleep(&mut shutdown).await;
                        }
                        Err(_) => {
                            warn!(worker_id = %self.id, "dequeue cycle overran its bound");
                        }
                    }
                }
            }
        }

        self.counters.active.store(false, Ordering::SeqCst);
        info!(worker_id = %self.id, "worker stopped");
    }

    async fn idle_sleep(&self, shutdown: &mut watch::Receiver<bool>) {
        tokio::select! {
            _ = shutdown.changed() => {}
            _ = tokio::time::sleep(self.poll_interval) => {}
        }
    }

    async fn handle_job(&self, mut job: Job, shutdown: &mut watch::Receiver<bool>) {
        // Admission check before the attempt counter moves. A denied job
        // rejoins the rear of its priority line; a limiter error is
        // treated the same way so broker trouble never consumes retries.
        match self.limiter.allow(&job.job_type).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    worker_id = %self.id,
                    job_id = %job.id,
                    job_type = %job.job_type,
                    "rate limited, returning job to its queue"
                );
                self.requeue(&job).await;
                return;
            }
            Err(e) => {
                warn!(worker_id = %self.id, job_id = %job.id, error = %e, "rate limiter check failed");
                self.requeue(&job).await;
                return;
            }
        }

        let attempts_before = job.attempts;
        job.increment_attempts();

        info!(
            worker_id = %self.id,
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = job.attempts,
            max_retries = job.max_retries,
            "starting job execution"
        );

        let started = Instant::now();
        let registry = Arc::clone(&self.registry);
        let dispatched = job.clone();
        // Dispatch on its own task so a panicking handler unwinds there
        // and can be converted into a failed result.
        let mut handle = tokio::spawn(async move { registry.process(&dispatched, started).await });

        let result = tokio::select! {
            joined = &mut handle => match joined {
                Ok(result) => result,
                Err(join_err) if join_err.is_panic() => crate::job::JobResult::failed(
                    job.id.clone(),
                    format!("handler panicked: {}", join_err),
                    started.elapsed(),
                ),
                Err(join_err) => crate::job::JobResult::failed(
                    job.id.clone(),
                    format!("handler task failed: {}", join_err),
                    started.elapsed(),
                ),
            },
            _ = tokio::time::sleep(self.job_timeout) => {
                handle.abort();
                crate::job::JobResult::failed(
                    job.id.clone(),
                    format!("job execution exceeded {:?}", self.job_timeout),
                    started.elapsed(),
                )
            }
            _ = shutdown.changed() => {
                // Soft abort: the run does not count as an attempt, the
                // job goes back with its pre-dispatch counter.
                handle.abort();
                warn!(
                    worker_id = %self.id,
                    job_id = %job.id,
                    "shutdown cancelled in-flight job, requeueing"
                );
                let mut aborted = job.clone();
                aborted.attempts = attempts_before;
                self.requeue(&aborted).await;
                return;
            }
        };

        match result.status {
            JobStatus::Completed => {
                self.counters.processed.fetch_add(1, Ordering::SeqCst);
                info!(
                    worker_id = %self.id,
                    job_id = %job.id,
                    duration_ms = result.duration.as_millis() as u64,
                    "job completed"
                );
            }
            _ => {
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                let error = result
                    .error
                    .unwrap_or_else(|| "unknown handler error".to_string());

                if job.should_retry() {
                    self.counters.retried.fetch_add(1, Ordering::SeqCst);
                    let delay = retry_backoff(job.attempts);
                    warn!(
                        worker_id = %self.id,
                        job_id = %job.id,
                        error = %error,
                        attempt = job.attempts,
                        max_retries = job.max_retries,
                        delay_secs = delay.as_secs(),
                        "job failed, scheduling retry"
                    );

                    // The retry rides the scheduled set so the delay is
                    // broker-observable and survives process death.
                    let execute_at =
                        Utc::now() + TimeDelta::from_std(delay).unwrap_or(TimeDelta::zero());
                    if let Err(e) = self.scheduled.schedule(&job, execute_at).await {
                        error!(worker_id = %self.id, job_id = %job.id, error = %e, "failed to schedule retry");
                    }
                } else {
                    error!(
                        worker_id = %self.id,
                        job_id = %job.id,
                        error = %error,
                        attempts = job.attempts,
                        "job failed permanently, moving to dead letter queue"
                    );
                    if let Err(e) = self.dlq.send(&job, &error).await {
                        error!(worker_id = %self.id, job_id = %job.id, error = %e, "failed to send job to dead letter queue");
                    }
                }
            }
        }
    }

    async fn requeue(&self, job: &Job) {
        if let Err(e) = self.queue.enqueue(job).await {
            error!(worker_id = %self.id, job_id = %job.id, error = %e, "failed to requeue job");
        }
    }
}

pub(crate) fn worker_stats(worker_id: &str, counters: &WorkerCounters) -> WorkerStats {
    WorkerStats {
        worker_id: worker_id.to_string(),
        jobs_processed: counters.processed.load(Ordering::SeqCst),
        jobs_failed: counters.failed.load(Ordering::SeqCst),
        jobs_retried: counters.retried.load(Ordering::SeqCst),
        is_active: counters.active.load(Ordering::SeqCst),
    }
}
