//! Fixed-size worker pool with graceful shutdown.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::dlq::DeadLetterQueue;
use crate::error::{QueueError, QueueResult};
use crate::limiter::RateLimiter;
use crate::queue::Queue;
use crate::registry::HandlerRegistry;
use crate::scheduled::ScheduledQueue;
use crate::worker::{worker_stats, Worker, WorkerCounters, WorkerStats};

/// How often the aggregator folds per-worker counters into pool totals.
const AGGREGATE_INTERVAL: Duration = Duration::from_secs(10);

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker tasks.
    pub concurrency: usize,

    /// How long `stop` waits for workers to finish their current job.
    pub shutdown_timeout: Duration,

    /// Sleep between empty dequeue cycles.
    pub poll_interval: Duration,

    /// Per-job execution deadline.
    pub job_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            shutdown_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            job_timeout: Duration::from_secs(30),
        }
    }
}

/// Aggregate pool statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStats {
    pub total_workers: usize,
    pub active_workers: usize,
    pub total_processed: u64,
    pub total_failed: u64,
    pub total_retried: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct PoolTotals {
    processed: u64,
    failed: u64,
    retried: u64,
}

/// A fixed set of cooperative workers sharing one queue, registry, and
/// rate limiter.
pub struct WorkerPool {
    config: PoolConfig,
    queue: Arc<dyn Queue>,
    scheduled: Arc<ScheduledQueue>,
    dlq: Arc<DeadLetterQueue>,
    registry: Arc<HandlerRegistry>,
    limiter: Arc<dyn RateLimiter>,

    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    workers: Mutex<Vec<(String, Arc<WorkerCounters>)>>,
    totals: Arc<Mutex<PoolTotals>>,
}

impl WorkerPool {
    pub fn new(
        config: PoolConfig,
        queue: Arc<dyn Queue>,
        scheduled: Arc<ScheduledQueue>,
        dlq: Arc<DeadLetterQueue>,
        registry: Arc<HandlerRegistry>,
        limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            queue,
            scheduled,
            dlq,
            registry,
            limiter,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
            totals: Arc::new(Mutex::new(PoolTotals::default())),
        }
    }

    /// Spawn the worker tasks and the counter aggregator. Returns as
    /// soon as everything is launched.
    pub fn start(&self) -> QueueResult<()> {
        info!(concurrency = self.config.concurrency, "starting worker pool");

        let mut tasks = self.tasks.lock().unwrap();
        let mut workers = self.workers.lock().unwrap();

        for i in 0..self.config.concurrency {
            let counters = Arc::new(WorkerCounters::default());
            let worker = Worker {
                id: format!("worker-{}", i + 1),
                poll_interval: self.config.poll_interval,
                job_timeout: self.config.job_timeout,
                queue: Arc::clone(&self.queue),
                scheduled: Arc::clone(&self.scheduled),
                dlq: Arc::clone(&self.dlq),
                registry: Arc::clone(&self.registry),
                limiter: Arc::clone(&self.limiter),
                counters: Arc::clone(&counters),
            };

            workers.push((worker.id.clone(), counters));
            let shutdown = self.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(worker.run(shutdown)));
        }

        tasks.push(self.spawn_aggregator(workers.clone()));

        info!("worker pool started");
        Ok(())
    }

    /// Observational ticker folding per-worker atomics into pool totals.
    fn spawn_aggregator(&self, workers: Vec<(String, Arc<WorkerCounters>)>) -> JoinHandle<()> {
        let totals = Arc::clone(&self.totals);
        let mut shutdown = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                    _ = tokio::time::sleep(AGGREGATE_INTERVAL) => {
                        let mut folded = PoolTotals::default();
                        let mut active = 0usize;
                        for (_, counters) in &workers {
                            let stats = worker_stats("", counters);
                            folded.processed += stats.jobs_processed;
                            folded.failed += stats.jobs_failed;
                            folded.retried += stats.jobs_retried;
                            if stats.is_active {
                                active += 1;
                            }
                        }
                        *totals.lock().unwrap() = folded;

                        info!(
                            processed = folded.processed,
                            failed = folded.failed,
                            retried = folded.retried,
                            active_workers = active,
                            "worker pool metrics"
                        );
                    }
                }
            }
        })
    }

    /// Signal every worker to stop and wait for them to finish their
    /// current job, up to the configured shutdown timeout.
    pub async fn stop(&self) -> QueueResult<()> {
        info!(timeout = ?self.config.shutdown_timeout, "stopping worker pool");

        let _ = self.shutdown_tx.send(true);

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().unwrap());
        let join_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };

        match tokio::time::timeout(self.config.shutdown_timeout, join_all).await {
            Ok(()) => {
                info!("worker pool stopped gracefully");
                Ok(())
            }
            Err(_) => {
                warn!("worker pool shutdown timeout exceeded");
                Err(QueueError::ShutdownTimeout(self.config.shutdown_timeout))
            }
        }
    }

    /// Aggregate statistics: lazily folded totals plus a live active
    /// count.
    pub fn stats(&self) -> PoolStats {
        let totals = *self.totals.lock().unwrap();
        let workers = self.workers.lock().unwrap();
        let active_workers = workers
            .iter()
            .filter(|(_, counters)| counters.active.load(std::sync::atomic::Ordering::SeqCst))
            .count();

        PoolStats {
            total_workers: self.config.concurrency,
            active_workers,
            total_processed: totals.processed,
            total_failed: totals.failed,
            total_retried: totals.retried,
        }
    }

    /// Live per-worker statistics.
    pub fn worker_stats(&self) -> Vec<WorkerStats> {
        self.workers
            .lock()
            .unwrap()
            .iter()
            .map(|(id, counters)| worker_stats(id, counters))
            .collect()
    }
}
