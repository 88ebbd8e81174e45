//! The queue contract and the single-list implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::Serialize;
use tracing::debug;

use crate::error::QueueResult;
use crate::job::Job;

/// List holding serialized jobs in single-priority mode.
pub(crate) const JOB_QUEUE_KEY: &str = "job_queue";
/// Hash holding enqueue/dequeue counters.
pub(crate) const QUEUE_STATS_KEY: &str = "queue_stats";

/// How long one blocking dequeue cycle may wait on the broker.
pub(crate) const DEQUEUE_BLOCK_SECS: usize = 1;

/// The contract every job queue exposes to the rest of the system.
///
/// `dequeue` blocks for at most one cycle and returns `None` when no job
/// was available, letting workers poll cooperatively.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Add a job to the queue.
    async fn enqueue(&self, job: &Job) -> QueueResult<()>;

    /// Remove and return the next job, or `None` after an empty cycle.
    async fn dequeue(&self) -> QueueResult<Option<Job>>;

    /// Current number of queued jobs.
    async fn size(&self) -> QueueResult<usize>;

    /// Check that the broker behind the queue is reachable.
    async fn health(&self) -> QueueResult<()>;
}

/// Aggregate queue counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub queue_size: usize,
    pub total_enqueued: u64,
    pub total_dequeued: u64,
}

/// Single-list queue over the broker.
#[derive(Clone)]
pub struct SimpleQueue {
    redis: ConnectionManager,
}

impl SimpleQueue {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    /// Queue size and counters in one pipelined round trip.
    pub async fn stats(&self) -> QueueResult<QueueStats> {
        let mut conn = self.redis.clone();

        let (size, counters): (usize, HashMap<String, String>) = redis::pipe()
            .cmd("LLEN")
            .arg(JOB_QUEUE_KEY)
            .cmd("HGETALL")
            .arg(QUEUE_STATS_KEY)
            .query_async(&mut conn)
            .await?;

        Ok(QueueStats {
            queue_size: size,
            total_enqueued: parse_counter(&counters, "total_enqueued"),
            total_dequeued: parse_counter(&counters, "total_dequeued"),
        })
    }
}

pub(crate) fn parse_counter(counters: &HashMap<String, String>, field: &str) -> u64 {
    counters
        .get(field)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl Queue for SimpleQueue {
    async fn enqueue(&self, job: &Job) -> QueueResult<()> {
        job.validate()?;

        let data = serde_json::to_string(job)?;
        let mut conn = self.redis.clone();

        // Data move and counter update share one pipelined batch.
        redis::pipe()
            .cmd("LPUSH")
            .arg(JOB_QUEUE_KEY)
            .arg(&data)
            .ignore()
            .cmd("HINCRBY")
            .arg(QUEUE_STATS_KEY)
            .arg("total_enqueued")
            .arg(1)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(job_id = %job.id, job_type = %job.job_type, "enqueued job");
        Ok(())
    }

    async fn dequeue(&self) -> QueueResult<Option<Job>> {
        let mut conn = self.redis.clone();

        let reply: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(JOB_QUEUE_KEY)
            .arg(DEQUEUE_BLOCK_SECS)
            .query_async(&mut conn)
            .await?;

        let Some((_, data)) = reply else {
            return Ok(None);
        };

        let job: Job = serde_json::from_str(&data)?;

        // Counter update is detached so a cancelled caller cannot lose it.
        let mut stats_conn = self.redis.clone();
        tokio::spawn(async move {
            let mut cmd = redis::cmd("HINCRBY");
            cmd.arg(QUEUE_STATS_KEY).arg("total_dequeued").arg(1);
            let update = cmd.query_async::<()>(&mut stats_conn);
            match tokio::time::timeout(Duration::from_secs(5), update).await {
                Ok(Err(e)) => debug!(error = %e, "failed to update dequeue counter"),
                Err(_) => debug!("dequeue counter update timed out"),
                Ok(Ok(())) => {}
            }
        });

        Ok(Some(job))
    }

    async fn size(&self) -> QueueResult<usize> {
        let mut conn = self.redis.clone();
        let len: usize = redis::cmd("LLEN")
            .arg(JOB_QUEUE_KEY)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    async fn health(&self) -> QueueResult<()> {
        let mut conn = self.redis.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_counter() {
        let mut counters = HashMap::new();
        counters.insert("total_enqueued".to_string(), "42".to_string());
        counters.insert("total_dequeued".to_string(), "nonsense".to_string());

        assert_eq!(parse_counter(&counters, "total_enqueued"), 42);
        assert_eq!(parse_counter(&counters, "total_dequeued"), 0);
        assert_eq!(parse_counter(&counters, "missing"), 0);
    }
}
