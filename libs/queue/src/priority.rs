//! Priority-aware queue with weighted-fair dispatch.
//!
//! Three lists, one per priority. Selection uses the running dequeue
//! counters: for each priority `p`, `ratio(p) = weight(p) / (count(p) + 1)`
//! and the list with the maximal ratio is tried first, ties breaking
//! high → normal → low. Over a long window the dequeue mix converges to
//! the configured weights while no priority starves.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::debug;

use crate::error::QueueResult;
use crate::job::{Job, Priority};
use crate::queue::{parse_counter, Queue, QueueStats, DEQUEUE_BLOCK_SECS, QUEUE_STATS_KEY};

const HIGH_QUEUE_KEY: &str = "queue:high";
const NORMAL_QUEUE_KEY: &str = "queue:normal";
const LOW_QUEUE_KEY: &str = "queue:low";

/// Hash of running per-priority dequeue counts driving the ratio rule.
const PRIORITY_COUNTERS_KEY: &str = "priority_counters";

fn queue_key(priority: Priority) -> &'static str {
    match priority {
        Priority::High => HIGH_QUEUE_KEY,
        Priority::Normal => NORMAL_QUEUE_KEY,
        Priority::Low => LOW_QUEUE_KEY,
    }
}

/// Relative dispatch shares per priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityWeights {
    pub high: u32,
    pub normal: u32,
    pub low: u32,
}

impl PriorityWeights {
    fn weight(&self, priority: Priority) -> u32 {
        match priority {
            Priority::High => self.high,
            Priority::Normal => self.normal,
            Priority::Low => self.low,
        }
    }
}

impl Default for PriorityWeights {
    fn default() -> Self {
        // Dispatch roughly 5 high : 3 normal : 1 low
        Self {
            high: 5,
            normal: 3,
            low: 1,
        }
    }
}

/// Pick the priority with the maximal weight/(count+1) ratio.
///
/// Iteration order doubles as the tie-breaker: high wins over normal
/// wins over low.
fn select_priority(weights: PriorityWeights, counters: &HashMap<Priority, u64>) -> Priority {
    let mut best = Priority::High;
    let mut best_ratio = f64::MIN;

    for priority in Priority::ALL {
        let count = counters.get(&priority).copied().unwrap_or(0);
        let ratio = f64::from(weights.weight(priority)) / (count as f64 + 1.0);
        if ratio > best_ratio {
            best = priority;
            best_ratio = ratio;
        }
    }

    best
}

/// Priority queue over the broker.
pub struct PriorityQueue {
    redis: ConnectionManager,
    weights: RwLock<PriorityWeights>,
}

impl PriorityQueue {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            weights: RwLock::new(PriorityWeights::default()),
        }
    }

    /// Reconfigure the dispatch shares.
    pub fn set_priority_weights(&self, high: u32, normal: u32, low: u32) {
        *self.weights.write().unwrap() = PriorityWeights { high, normal, low };
    }

    pub fn priority_weights(&self) -> PriorityWeights {
        *self.weights.read().unwrap()
    }

    /// Total size and counters in one pipelined round trip.
    pub async fn stats(&self) -> QueueResult<QueueStats> {
        let mut conn = self.redis.clone();

        let (high, normal, low, counters): (usize, usize, usize, HashMap<String, String>) =
            redis::pipe()
                .cmd("LLEN")
                .arg(HIGH_QUEUE_KEY)
                .cmd("LLEN")
                .arg(NORMAL_QUEUE_KEY)
                .cmd("LLEN")
                .arg(LOW_QUEUE_KEY)
                .cmd("HGETALL")
                .arg(QUEUE_STATS_KEY)
                .query_async(&mut conn)
                .await?;

        Ok(QueueStats {
            queue_size: high + normal + low,
            total_enqueued: parse_counter(&counters, "total_enqueued"),
            total_dequeued: parse_counter(&counters, "total_dequeued"),
        })
    }

    /// Per-list lengths in one pipelined round trip.
    pub async fn size_by_priority(&self) -> QueueResult<HashMap<Priority, usize>> {
        let mut conn = self.redis.clone();

        let (high, normal, low): (usize, usize, usize) = redis::pipe()
            .cmd("LLEN")
            .arg(HIGH_QUEUE_KEY)
            .cmd("LLEN")
            .arg(NORMAL_QUEUE_KEY)
            .cmd("LLEN")
            .arg(LOW_QUEUE_KEY)
            .query_async(&mut conn)
            .await?;

        Ok(HashMap::from([
            (Priority::High, high),
            (Priority::Normal, normal),
            (Priority::Low, low),
        ]))
    }

    async fn priority_counters(&self) -> QueueResult<HashMap<Priority, u64>> {
        let mut conn = self.redis.clone();

        let raw: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(PRIORITY_COUNTERS_KEY)
            .query_async(&mut conn)
            .await?;

        let mut counters = HashMap::new();
        for priority in Priority::ALL {
            counters.insert(priority, parse_counter(&raw, priority.as_ref()));
        }
        Ok(counters)
    }

    async fn record_dequeue(&self, priority: Priority) -> QueueResult<()> {
        let mut conn = self.redis.clone();
        redis::pipe()
            .cmd("HINCRBY")
            .arg(QUEUE_STATS_KEY)
            .arg("total_dequeued")
            .arg(1)
            .ignore()
            .cmd("HINCRBY")
            .arg(QUEUE_STATS_KEY)
            .arg(format!("dequeued:{}", priority))
            .arg(1)
            .ignore()
            .cmd("HINCRBY")
            .arg(PRIORITY_COUNTERS_KEY)
            .arg(priority.as_ref())
            .arg(1)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Queue for PriorityQueue {
    async fn enqueue(&self, job: &Job) -> QueueResult<()> {
        job.validate()?;

        let priority = job.priority();
        let data = serde_json::to_string(job)?;
        let mut conn = self.redis.clone();

        redis::pipe()
            .cmd("LPUSH")
            .arg(queue_key(priority))
            .arg(&data)
            .ignore()
            .cmd("HINCRBY")
            .arg(QUEUE_STATS_KEY)
            .arg("total_enqueued")
            .arg(1)
            .ignore()
            .cmd("HINCRBY")
            .arg(QUEUE_STATS_KEY)
            .arg(format!("enqueued:{}", priority))
            .arg(1)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(job_id = %job.id, job_type = %job.job_type, priority = %priority, "enqueued job");
        Ok(())
    }

    async fn dequeue(&self) -> QueueResult<Option<Job>> {
        let counters = self.priority_counters().await?;
        let selected = select_priority(self.priority_weights(), &counters);

        let mut conn = self.redis.clone();

        // One blocking try on the ratio-selected list bounds the cycle.
        let reply: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(queue_key(selected))
            .arg(DEQUEUE_BLOCK_SECS)
            .query_async(&mut conn)
            .await?;

        let (priority, data) = match reply {
            Some((_, data)) => (selected, data),
            None => {
                // Empty: fall through the remaining lists in descending
                // priority order without blocking again.
                let mut found = None;
                for priority in Priority::ALL {
                    if priority == selected {
                        continue;
                    }
                    let popped: Option<String> = redis::cmd("RPOP")
                        .arg(queue_key(priority))
                        .query_async(&mut conn)
                        .await?;
                    if let Some(data) = popped {
                        found = Some((priority, data));
                        break;
                    }
                }
                match found {
                    Some(hit) => hit,
                    None => return Ok(None),
                }
            }
        };

        self.record_dequeue(priority).await?;

        let job: Job = serde_json::from_str(&data)?;
        Ok(Some(job))
    }

    async fn size(&self) -> QueueResult<usize> {
        let sizes = self.size_by_priority().await?;
        Ok(sizes.values().sum())
    }

    async fn health(&self) -> QueueResult<()> {
        let mut conn = self.redis.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
