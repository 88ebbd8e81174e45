//! Token-bucket admission control keyed by job type.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use redis::aio::ConnectionManager;

use crate::error::QueueResult;

/// Admission control for job dispatch.
///
/// `allow` consumes one token when admission is granted. `done` is a
/// reserved hook for lease-style tokens and is currently a no-op in both
/// implementations.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Try to consume a token for the given job type.
    async fn allow(&self, job_type: &str) -> QueueResult<bool>;

    /// Update the stored rate (tokens/second) and burst for a job type.
    /// Does not retroactively refill.
    async fn set_limit(&self, job_type: &str, rate: f64, burst: u32) -> QueueResult<()>;

    /// Mark the completion of a job of the given type.
    async fn done(&self, job_type: &str) -> QueueResult<()>;
}

struct TokenBucket {
    rate: f64,
    burst: u32,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate: f64, burst: u32) -> Self {
        Self {
            rate,
            burst,
            tokens: f64::from(burst),
            last_refill: Instant::now(),
        }
    }

    /// Lazy refill from wall-clock elapsed, then try to take one token.
    fn try_take(&mut self) -> bool {
        let refilled = (self.tokens + self.last_refill.elapsed().as_secs_f64() * self.rate)
            .min(f64::from(self.burst));

        if refilled < 1.0 {
            return false;
        }

        self.tokens = refilled - 1.0;
        self.last_refill = Instant::now();
        true
    }
}

/// In-process rate limiter; limits apply per worker process.
pub struct LocalRateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    default_rate: f64,
    default_burst: u32,
}

impl LocalRateLimiter {
    pub fn new(default_rate: f64, default_burst: u32) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            default_rate,
            default_burst,
        }
    }
}

#[async_trait]
impl RateLimiter for LocalRateLimiter {
    async fn allow(&self, job_type: &str) -> QueueResult<bool> {
        let mut buckets = self.buckets.lock().unwrap();
        let bucket = buckets
            .entry(job_type.to_string())
            .or_insert_with(|| TokenBucket::new(self.default_rate, self.default_burst));
        Ok(bucket.try_take())
    }

    async fn set_limit(&self, job_type: &str, rate: f64, burst: u32) -> QueueResult<()> {
        let mut buckets = self.buckets.lock().unwrap();
        match buckets.get_mut(job_type) {
            Some(bucket) => {
                bucket.rate = rate;
                bucket.burst = burst;
            }
            None => {
                buckets.insert(job_type.to_string(), TokenBucket::new(rate, burst));
            }
        }
        Ok(())
    }

    async fn done(&self, _job_type: &str) -> QueueResult<()> {
        Ok(())
    }
}

/// Broker-resident rate limiter; limits are shared across the fleet.
///
/// The read-compute-write cycle is not transactional: concurrent workers
/// may over-admit by a token or two, which is acceptable.
pub struct SharedRateLimiter {
    redis: ConnectionManager,
    prefix: String,
    default_rate: f64,
    default_burst: u32,
}

impl SharedRateLimiter {
    pub fn new(
        redis: ConnectionManager,
        prefix: impl Into<String>,
        default_rate: f64,
        default_burst: u32,
    ) -> Self {
        Self {
            redis,
            prefix: prefix.into(),
            default_rate,
            default_burst,
        }
    }

    fn limits_key(&self, job_type: &str) -> String {
        format!("{}:limits:{}", self.prefix, job_type)
    }

    fn tokens_key(&self, job_type: &str) -> String {
        format!("{}:tokens:{}", self.prefix, job_type)
    }
}

#[async_trait]
impl RateLimiter for SharedRateLimiter {
    async fn allow(&self, job_type: &str) -> QueueResult<bool> {
        let limits_key = self.limits_key(job_type);
        let tokens_key = self.tokens_key(job_type);
        let mut conn = self.redis.clone();

        let (rate_raw, burst_raw, last_raw, tokens_raw): (
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
        ) = redis::pipe()
            .cmd("HGET")
            .arg(&limits_key)
            .arg("limit")
            .cmd("HGET")
            .arg(&limits_key)
            .arg("burst")
            .cmd("HGET")
            .arg(&limits_key)
            .arg("last_updated")
            .cmd("GET")
            .arg(&tokens_key)
            .query_async(&mut conn)
            .await?;

        // Parse with defaults; junk values fall back rather than failing
        // admission outright.
        let rate: f64 = rate_raw
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(self.default_rate);
        let burst: u32 = burst_raw
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(self.default_burst);
        let last_updated: DateTime<Utc> = last_raw
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| Utc::now() - TimeDelta::hours(24));
        let tokens: f64 = tokens_raw
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(f64::from(burst));

        let now = Utc::now();
        let elapsed = (now - last_updated)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let refilled = (tokens + elapsed * rate).min(f64::from(burst));

        if refilled < 1.0 {
            return Ok(false);
        }

        redis::pipe()
            .cmd("SET")
            .arg(&tokens_key)
            .arg(format!("{:.6}", refilled - 1.0))
            .ignore()
            .cmd("HSET")
            .arg(&limits_key)
            .arg("last_updated")
            .arg(now.to_rfc3339())
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        Ok(true)
    }

    async fn set_limit(&self, job_type: &str, rate: f64, burst: u32) -> QueueResult<()> {
        let limits_key = self.limits_key(job_type);
        let mut conn = self.redis.clone();

        let _: () = redis::cmd("HSET")
            .arg(&limits_key)
            .arg("limit")
            .arg(format!("{:.6}", rate))
            .arg("burst")
            .arg(burst)
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn done(&self, _job_type: &str) -> QueueResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_local_limiter_consumes_burst() {
        let limiter = LocalRateLimiter::new(1.0, 3);

        assert!(limiter.allow("bulk").await.unwrap());
        assert!(limiter.allow("bulk").await.unwrap());
        assert!(limiter.allow("bulk").await.unwrap());
        assert!(!limiter.allow("bulk").await.unwrap());
    }

    #[tokio::test]
    async fn test_local_limiter_refills_over_time() {
        // 20 tokens/second so the refill lands within a short test sleep
        let limiter = LocalRateLimiter::new(20.0, 1);

        assert!(limiter.allow("bulk").await.unwrap());
        assert!(!limiter.allow("bulk").await.unwrap());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(limiter.allow("bulk").await.unwrap());
    }

    #[tokio::test]
    async fn test_local_limiter_types_are_independent() {
        let limiter = LocalRateLimiter::new(1.0, 1);

        assert!(limiter.allow("email").await.unwrap());
        assert!(!limiter.allow("email").await.unwrap());
        assert!(limiter.allow("math").await.unwrap());
    }

    #[tokio::test]
    async fn test_local_set_limit_overrides_defaults() {
        let limiter = LocalRateLimiter::new(1.0, 1);
        limiter.set_limit("bulk", 5.0, 3).await.unwrap();

        assert!(limiter.allow("bulk").await.unwrap());
        assert!(limiter.allow("bulk").await.unwrap());
        assert!(limiter.allow("bulk").await.unwrap());
        assert!(!limiter.allow("bulk").await.unwrap());
    }

    #[tokio::test]
    async fn test_local_set_limit_does_not_refill() {
        let limiter = LocalRateLimiter::new(0.0, 1);

        assert!(limiter.allow("bulk").await.unwrap());
        assert!(!limiter.allow("bulk").await.unwrap());

        // Raising the burst does not hand back tokens already spent
        limiter.set_limit("bulk", 0.0, 5).await.unwrap();
        assert!(!limiter.allow("bulk").await.unwrap());
    }

    #[tokio::test]
    async fn test_done_is_a_noop() {
        let limiter = LocalRateLimiter::new(1.0, 1);
        limiter.done("bulk").await.unwrap();
        assert!(limiter.allow("bulk").await.unwrap());
    }

    #[test]
    fn test_shared_limiter_key_layout() {
        // Key names are contractual across the fleet
        let prefix = "ratelimit";
        assert_eq!(
            format!("{}:limits:{}", prefix, "email"),
            "ratelimit:limits:email"
        );
        assert_eq!(
            format!("{}:tokens:{}", prefix, "email"),
            "ratelimit:tokens:email"
        );
    }
}
