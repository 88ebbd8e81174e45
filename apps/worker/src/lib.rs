//! Drudge Worker
//!
//! Drains jobs from the broker's priority queues, executes the
//! registered handlers, retries failures with exponential backoff
//! through the scheduled set, and parks exhausted jobs in the dead
//! letter queue.
//!
//! ```text
//! queue:high / queue:normal / queue:low
//!   ↓ (weighted-fair dequeue)
//! WorkerPool → HandlerRegistry → email / image_resize / math
//!   ↓ failure                         ↓ retry backoff
//! dlq:jobs  ←──────────────────  scheduled_jobs (Scheduler tick)
//! ```

mod handlers;

use std::sync::Arc;
use std::time::Duration;

use drudge_broker::{connect_with_backoff, probe, DialConfig};
use drudge_config::{Config, FromEnv};
use drudge_queue::{
    DeadLetterQueue, HandlerRegistry, LocalRateLimiter, PoolConfig, PriorityQueue, Queue,
    RateLimiter, ScheduledQueue, Scheduler, WorkerPool,
};
use eyre::{Result, WrapErr};
use tokio::signal;
use tracing::{error, info};

/// Default per-type admission when no explicit limit is set.
const DEFAULT_RATE_LIMIT: f64 = 100.0;
const DEFAULT_RATE_BURST: u32 = 100;

/// Cadence of the scheduled-set promotion tick.
const SCHEDULER_TICK: Duration = Duration::from_secs(1);

/// Run the worker process until SIGINT or SIGTERM.
pub async fn run() -> Result<()> {
    let config = Config::from_env().wrap_err("failed to load configuration")?;
    drudge_config::tracing::init(&config.log);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        concurrency = config.worker.concurrency,
        "starting drudge worker"
    );

    let redis = connect_with_backoff(&config.broker.connection_url(), DialConfig::default())
        .await
        .wrap_err("failed to connect to broker")?;

    let health = probe(&mut redis.clone()).await;
    info!(latency_ms = health.latency_ms, "broker responding");

    let queue: Arc<dyn Queue> = Arc::new(PriorityQueue::new(redis.clone()));
    let scheduled = Arc::new(ScheduledQueue::new(redis.clone(), Arc::clone(&queue)));
    let dlq = Arc::new(DeadLetterQueue::new(redis.clone(), Arc::clone(&queue)));

    let registry = Arc::new(HandlerRegistry::new());
    handlers::register_all(&registry).wrap_err("failed to register job handlers")?;

    let limiter: Arc<dyn RateLimiter> =
        Arc::new(LocalRateLimiter::new(DEFAULT_RATE_LIMIT, DEFAULT_RATE_BURST));

    let pool_config = PoolConfig {
        concurrency: config.worker.concurrency,
        shutdown_timeout: config.worker.shutdown_timeout,
        poll_interval: config.worker.poll_interval,
        ..PoolConfig::default()
    };
    let pool = WorkerPool::new(
        pool_config,
        Arc::clone(&queue),
        Arc::clone(&scheduled),
        dlq,
        registry,
        limiter,
    );

    let scheduler = Scheduler::new(Arc::clone(&scheduled), SCHEDULER_TICK);
    scheduler.start();
    pool.start().wrap_err("failed to start worker pool")?;

    shutdown_signal().await;
    info!("shutting down worker");

    if let Err(e) = pool.stop().await {
        error!(error = %e, "worker pool did not stop cleanly");
    }
    scheduler.stop().await;

    info!("worker shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        },
        _ = terminate => {
            info!("received SIGTERM, initiating shutdown");
        },
    }
}
