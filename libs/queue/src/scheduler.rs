//! Ticker that promotes due scheduled jobs.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::scheduled::ScheduledQueue;

/// Drives [`ScheduledQueue::process_due_jobs`] at a bounded cadence.
///
/// Tick failures are logged and the ticker keeps running; the next tick
/// simply sees the same due entries again.
pub struct Scheduler {
    scheduled: Arc<ScheduledQueue>,
    tick_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(scheduled: Arc<ScheduledQueue>, tick_interval: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            scheduled,
            tick_interval,
            shutdown_tx,
            task: std::sync::Mutex::new(None),
        }
    }

    /// Spawn the ticker task. Returns immediately.
    pub fn start(&self) {
        let scheduled = Arc::clone(&self.scheduled);
        let tick_interval = self.tick_interval;
        let mut shutdown = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            info!(interval = ?tick_interval, "scheduler started");

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(tick_interval) => {
                        match scheduled.process_due_jobs(Utc::now()).await {
                            Ok(0) => {}
                            Ok(promoted) => {
                                debug!(promoted, "promoted due scheduled jobs");
                            }
                            Err(e) => {
                                error!(error = %e, "scheduler tick failed");
                            }
                        }
                    }
                }
            }

            info!("scheduler stopped");
        });

        *self.task.lock().unwrap() = Some(handle);
    }

    /// Stop the ticker and wait for it to finish its current tick.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.task.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}
