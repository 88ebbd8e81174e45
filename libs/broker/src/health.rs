//! Broker liveness probing.

use std::time::Instant;

use redis::aio::ConnectionManager;
use tracing::debug;

use crate::error::{BrokerError, BrokerResult};

/// Verify the broker answers a ping.
pub async fn ping(conn: &mut ConnectionManager) -> BrokerResult<()> {
    let reply: String = redis::cmd("PING").query_async(conn).await?;
    if reply != "PONG" {
        return Err(BrokerError::Unhealthy(format!(
            "unexpected ping reply '{}'",
            reply
        )));
    }
    debug!("broker ping ok");
    Ok(())
}

/// Outcome of a timed broker probe.
#[derive(Debug, Clone)]
pub struct BrokerHealth {
    pub healthy: bool,

    /// Round-trip time of the probe.
    pub latency_ms: u64,

    /// What went wrong, when unhealthy.
    pub detail: Option<String>,
}

/// Timed ping for readiness reporting. Never fails; an unreachable
/// broker yields an unhealthy report instead.
pub async fn probe(conn: &mut ConnectionManager) -> BrokerHealth {
    let started = Instant::now();
    match ping(conn).await {
        Ok(()) => BrokerHealth {
            healthy: true,
            latency_ms: started.elapsed().as_millis() as u64,
            detail: None,
        },
        Err(e) => BrokerHealth {
            healthy: false,
            latency_ms: started.elapsed().as_millis() as u64,
            detail: Some(e.to_string()),
        },
    }
}
