//! Dead-letter queue for jobs that exhausted their retries.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use redis::aio::ConnectionManager;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::{FailedJobInfo, Job};
use crate::queue::Queue;

/// List of serialized failure records, newest first.
const DLQ_KEY: &str = "dlq:jobs";
/// Hash of DLQ counters.
const DLQ_STATS_KEY: &str = "dlq:stats";

/// DLQ counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DlqStats {
    pub total: i64,
    pub reprocessed: i64,
    pub by_type: HashMap<String, i64>,
}

/// Terminal resting place for failed jobs, with a path back to the main
/// queue via reprocessing.
pub struct DeadLetterQueue {
    redis: ConnectionManager,
    queue: Arc<dyn Queue>,
}

impl DeadLetterQueue {
    pub fn new(redis: ConnectionManager, queue: Arc<dyn Queue>) -> Self {
        Self { redis, queue }
    }

    /// Record a permanently failed job.
    pub async fn send(&self, job: &Job, error_message: &str) -> QueueResult<()> {
        let info = FailedJobInfo {
            job: job.clone(),
            error: error_message.to_string(),
            failed_at: Utc::now(),
        };

        let data = serde_json::to_string(&info)?;
        let mut conn = self.redis.clone();

        redis::pipe()
            .cmd("LPUSH")
            .arg(DLQ_KEY)
            .arg(&data)
            .ignore()
            .cmd("HINCRBY")
            .arg(DLQ_STATS_KEY)
            .arg("total")
            .arg(1)
            .ignore()
            .cmd("HINCRBY")
            .arg(DLQ_STATS_KEY)
            .arg(format!("type:{}", job.job_type))
            .arg(1)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempts = job.attempts,
            error = %error_message,
            "job moved to dead letter queue"
        );
        Ok(())
    }

    /// Number of entries in the DLQ.
    pub async fn size(&self) -> QueueResult<usize> {
        let mut conn = self.redis.clone();
        let len: usize = redis::cmd("LLEN")
            .arg(DLQ_KEY)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    /// Move one failed job back to the main queue by its job id.
    ///
    /// The attempt counter is reset and the update timestamp refreshed;
    /// the previous failure record is discarded.
    pub async fn reprocess(&self, job_id: &str) -> QueueResult<()> {
        let mut conn = self.redis.clone();

        let entries: Vec<String> = redis::cmd("LRANGE")
            .arg(DLQ_KEY)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;

        for raw in entries {
            let Ok(info) = serde_json::from_str::<FailedJobInfo>(&raw) else {
                continue;
            };
            if info.job.id == job_id {
                return self.requeue_entry(&raw, info).await;
            }
        }

        Err(QueueError::NotFound(format!(
            "job '{}' not in dead letter queue",
            job_id
        )))
    }

    /// Move every parseable entry back to the main queue. Returns the
    /// reprocessed job ids.
    pub async fn reprocess_all(&self) -> QueueResult<Vec<String>> {
        let mut conn = self.redis.clone();

        let entries: Vec<String> = redis::cmd("LRANGE")
            .arg(DLQ_KEY)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;

        let mut reprocessed = Vec::new();
        for raw in entries {
            let Ok(info) = serde_json::from_str::<FailedJobInfo>(&raw) else {
                continue;
            };
            let job_id = info.job.id.clone();
            match self.requeue_entry(&raw, info).await {
                Ok(()) => reprocessed.push(job_id),
                Err(e) => warn!(job_id = %job_id, error = %e, "failed to reprocess DLQ entry"),
            }
        }

        Ok(reprocessed)
    }

    async fn requeue_entry(&self, raw: &str, mut info: FailedJobInfo) -> QueueResult<()> {
        let mut conn = self.redis.clone();

        // Remove by exact value so a concurrent reprocess cannot requeue
        // the same entry twice.
        let removed: i64 = redis::cmd("LREM")
            .arg(DLQ_KEY)
            .arg(1)
            .arg(raw)
            .query_async(&mut conn)
            .await?;
        if removed == 0 {
            return Err(QueueError::NotFound(format!(
                "job '{}' not in dead letter queue",
                info.job.id
            )));
        }

        info.job.attempts = 0;
        info.job.updated_at = Utc::now();

        self.queue.enqueue(&info.job).await?;

        redis::pipe()
            .cmd("HINCRBY")
            .arg(DLQ_STATS_KEY)
            .arg("total")
            .arg(-1)
            .ignore()
            .cmd("HINCRBY")
            .arg(DLQ_STATS_KEY)
            .arg(format!("type:{}", info.job.job_type))
            .arg(-1)
            .ignore()
            .cmd("HINCRBY")
            .arg(DLQ_STATS_KEY)
            .arg("reprocessed")
            .arg(1)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        info!(job_id = %info.job.id, "reprocessed job from dead letter queue");
        Ok(())
    }

    /// Page through failure records. Malformed entries are skipped rather
    /// than aborting the listing.
    pub async fn list(&self, offset: usize, limit: usize) -> QueueResult<Vec<FailedJobInfo>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.redis.clone();
        let entries: Vec<String> = redis::cmd("LRANGE")
            .arg(DLQ_KEY)
            .arg(offset as i64)
            .arg((offset + limit - 1) as i64)
            .query_async(&mut conn)
            .await?;

        Ok(entries
            .iter()
            .filter_map(|raw| serde_json::from_str(raw).ok())
            .collect())
    }

    /// DLQ counters broken out by type.
    pub async fn stats(&self) -> QueueResult<DlqStats> {
        let mut conn = self.redis.clone();
        let raw: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(DLQ_STATS_KEY)
            .query_async(&mut conn)
            .await?;

        let mut stats = DlqStats::default();
        for (field, value) in raw {
            let Ok(count) = value.parse::<i64>() else {
                continue;
            };
            match field.as_str() {
                "total" => stats.total = count,
                "reprocessed" => stats.reprocessed = count,
                _ => {
                    if let Some(job_type) = field.strip_prefix("type:") {
                        stats.by_type.insert(job_type.to_string(), count);
                    }
                }
            }
        }

        Ok(stats)
    }
}
