//! Job Lifecycle Core
//!
//! The persistent queues and the machinery that drains them: priority
//! dispatch, scheduled and recurring jobs, retry with exponential
//! backoff, the dead-letter queue, per-type rate limiting, and the
//! worker pool.
//!
//! ## Architecture
//!
//! ```text
//! producer → JobSubmitter ─┬→ PriorityQueue ──→ WorkerPool → HandlerRegistry
//!                          └→ ScheduledQueue ─↗      │
//!                                 ↑  (Scheduler tick)│
//!                                 └── retry backoff ─┴→ DeadLetterQueue
//! ```
//!
//! All state lives in the broker; worker processes hold no authoritative
//! state and can come and go freely.
//!
//! ## Example
//!
//! ```ignore
//! use drudge_queue::{HandlerRegistry, JobSubmitter, LocalRateLimiter,
//!     PoolConfig, PriorityQueue, ScheduledQueue, DeadLetterQueue, WorkerPool};
//!
//! let queue = Arc::new(PriorityQueue::new(redis.clone()));
//! let scheduled = Arc::new(ScheduledQueue::new(redis.clone(), queue.clone()));
//! let dlq = Arc::new(DeadLetterQueue::new(redis.clone(), queue.clone()));
//!
//! let registry = Arc::new(HandlerRegistry::new());
//! registry.register(Arc::new(EmailHandler::new()))?;
//!
//! let pool = WorkerPool::new(PoolConfig::default(), queue, scheduled, dlq,
//!     registry, Arc::new(LocalRateLimiter::new(100.0, 10)));
//! pool.start()?;
//! ```

mod cron;
mod dlq;
mod error;
mod job;
mod limiter;
mod pool;
mod priority;
mod queue;
mod registry;
mod scheduled;
mod scheduler;
mod submit;
mod worker;

pub use cron::CronSchedule;
pub use dlq::{DeadLetterQueue, DlqStats};
pub use error::{QueueError, QueueResult};
pub use job::{FailedJobInfo, Job, JobMetadata, JobResult, JobStatus, Priority, ScheduledJob};
pub use limiter::{LocalRateLimiter, RateLimiter, SharedRateLimiter};
pub use pool::{PoolConfig, PoolStats, WorkerPool};
pub use priority::{PriorityQueue, PriorityWeights};
pub use queue::{Queue, QueueStats, SimpleQueue};
pub use registry::{HandlerRegistry, JobHandler};
pub use scheduled::ScheduledQueue;
pub use scheduler::Scheduler;
pub use submit::{JobRequest, JobResponse, JobSubmitter, SubmitStatus};
pub use worker::WorkerStats;
