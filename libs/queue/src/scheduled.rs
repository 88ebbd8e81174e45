//! Delayed and recurring jobs over the broker's sorted set.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use tracing::{debug, warn};

use crate::cron::CronSchedule;
use crate::error::{QueueError, QueueResult};
use crate::job::{Job, ScheduledJob};
use crate::queue::Queue;

/// Sorted set of serialized wrappers, scored by execute-at epoch seconds.
const SCHEDULED_JOBS_KEY: &str = "scheduled_jobs";
/// Hash of scheduling counters.
const SCHEDULED_STATS_KEY: &str = "scheduled_stats";

/// Queue of jobs waiting for a future execution time.
///
/// Holds a reference to the main queue so due jobs can be promoted in
/// place.
pub struct ScheduledQueue {
    redis: ConnectionManager,
    queue: Arc<dyn Queue>,
}

impl ScheduledQueue {
    pub fn new(redis: ConnectionManager, queue: Arc<dyn Queue>) -> Self {
        Self { redis, queue }
    }

    /// Schedule a one-shot job for a future time.
    pub async fn schedule(&self, job: &Job, execute_at: DateTime<Utc>) -> QueueResult<()> {
        job.validate()?;

        let wrapper = ScheduledJob {
            job: job.clone(),
            execute_at,
            recurring: false,
            cron_expression: None,
        };

        self.add_scheduled_job(&wrapper).await
    }

    /// Schedule a recurring job from a cron expression. The first
    /// occurrence lands at the expression's next match after now.
    pub async fn schedule_recurring(&self, job: &Job, cron_expr: &str) -> QueueResult<()> {
        job.validate()?;

        let schedule = CronSchedule::parse(cron_expr)?;
        let next = schedule.next(Utc::now()).ok_or_else(|| {
            QueueError::Validation(format!(
                "cron expression '{}' never produces a future time",
                cron_expr
            ))
        })?;

        let wrapper = ScheduledJob {
            job: job.clone(),
            execute_at: next,
            recurring: true,
            cron_expression: Some(cron_expr.to_string()),
        };

        self.add_scheduled_job(&wrapper).await
    }

    async fn add_scheduled_job(&self, wrapper: &ScheduledJob) -> QueueResult<()> {
        let data = serde_json::to_string(wrapper)?;
        let score = wrapper.execute_at.timestamp();
        let mut conn = self.redis.clone();

        let _: () = redis::cmd("ZADD")
            .arg(SCHEDULED_JOBS_KEY)
            .arg(score)
            .arg(&data)
            .query_async(&mut conn)
            .await?;

        let kind = if wrapper.recurring {
            "recurring"
        } else {
            "one_time"
        };
        redis::pipe()
            .cmd("HINCRBY")
            .arg(SCHEDULED_STATS_KEY)
            .arg("total")
            .arg(1)
            .ignore()
            .cmd("HINCRBY")
            .arg(SCHEDULED_STATS_KEY)
            .arg(kind)
            .arg(1)
            .ignore()
            .cmd("HINCRBY")
            .arg(SCHEDULED_STATS_KEY)
            .arg(format!("type:{}", wrapper.job.job_type))
            .arg(1)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(
            job_id = %wrapper.job.id,
            execute_at = %wrapper.execute_at,
            recurring = wrapper.recurring,
            "scheduled job"
        );
        Ok(())
    }

    /// Promote every entry due at `now` onto the main queue.
    ///
    /// Each entry is claimed by removing its exact member token first, so
    /// a concurrently re-fired tick cannot promote the same job twice. If
    /// the promotion enqueue then fails, the entry is put back for the
    /// next tick. Recurring entries re-insert a fresh clone at their next
    /// occurrence. Malformed entries are logged and skipped.
    ///
    /// Returns the number of jobs promoted.
    pub async fn process_due_jobs(&self, now: DateTime<Utc>) -> QueueResult<usize> {
        let mut conn = self.redis.clone();

        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(SCHEDULED_JOBS_KEY)
            .arg(0)
            .arg(now.timestamp())
            .query_async(&mut conn)
            .await?;

        let mut promoted = 0;

        for raw in due {
            let wrapper: ScheduledJob = match serde_json::from_str(&raw) {
                Ok(wrapper) => wrapper,
                Err(e) => {
                    warn!(error = %e, "skipping malformed scheduled entry");
                    continue;
                }
            };

            // Claim the entry by its member token; zero removals mean
            // another tick already owns it.
            let removed: i64 = match redis::cmd("ZREM")
                .arg(SCHEDULED_JOBS_KEY)
                .arg(&raw)
                .query_async(&mut conn)
                .await
            {
                Ok(removed) => removed,
                Err(e) => {
                    warn!(job_id = %wrapper.job.id, error = %e, "failed to claim scheduled entry");
                    continue;
                }
            };
            if removed == 0 {
                continue;
            }

            if let Err(e) = self.queue.enqueue(&wrapper.job).await {
                warn!(
                    job_id = %wrapper.job.id,
                    error = %e,
                    "failed to promote scheduled job, restoring entry"
                );
                let restore: Result<(), _> = redis::cmd("ZADD")
                    .arg(SCHEDULED_JOBS_KEY)
                    .arg(wrapper.execute_at.timestamp())
                    .arg(&raw)
                    .query_async(&mut conn)
                    .await;
                if let Err(e) = restore {
                    warn!(job_id = %wrapper.job.id, error = %e, "failed to restore scheduled entry");
                }
                continue;
            }

            if wrapper.recurring {
                self.reschedule_recurring(&wrapper, now).await;
            } else {
                let decrement: Result<(), _> = redis::cmd("HINCRBY")
                    .arg(SCHEDULED_STATS_KEY)
                    .arg("one_time")
                    .arg(-1)
                    .query_async(&mut conn)
                    .await;
                if let Err(e) = decrement {
                    debug!(error = %e, "failed to update scheduled stats");
                }
            }

            promoted += 1;
        }

        Ok(promoted)
    }

    /// Re-insert the next occurrence of a recurring entry. An invalidated
    /// expression ends the recurrence; anything else keeps it alive.
    async fn reschedule_recurring(&self, wrapper: &ScheduledJob, now: DateTime<Utc>) {
        let Some(expr) = wrapper.cron_expression.as_deref() else {
            warn!(job_id = %wrapper.job.id, "recurring entry has no cron expression, dropping");
            return;
        };

        let next = match CronSchedule::parse(expr).map(|s| s.next(now)) {
            Ok(Some(next)) => next,
            Ok(None) => {
                warn!(job_id = %wrapper.job.id, cron = %expr, "cron expression has no future match, dropping recurrence");
                return;
            }
            Err(e) => {
                warn!(job_id = %wrapper.job.id, cron = %expr, error = %e, "invalid cron expression, dropping recurrence");
                return;
            }
        };

        let next_wrapper = ScheduledJob {
            job: wrapper.job.clone_for_next_run(),
            execute_at: next,
            recurring: true,
            cron_expression: Some(expr.to_string()),
        };

        if let Err(e) = self.add_scheduled_job(&next_wrapper).await {
            warn!(job_id = %wrapper.job.id, error = %e, "failed to reschedule recurring job");
        }
    }

    /// Number of entries waiting in the scheduled set.
    pub async fn size(&self) -> QueueResult<usize> {
        let mut conn = self.redis.clone();
        let count: usize = redis::cmd("ZCARD")
            .arg(SCHEDULED_JOBS_KEY)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    /// Raw scheduling counters.
    pub async fn stats(&self) -> QueueResult<HashMap<String, i64>> {
        let mut conn = self.redis.clone();
        let raw: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(SCHEDULED_STATS_KEY)
            .query_async(&mut conn)
            .await?;

        Ok(raw
            .into_iter()
            .filter_map(|(field, value)| value.parse().ok().map(|v| (field, v)))
            .collect())
    }
}
