//! Redis broker client for the drudge job platform.
//!
//! The broker is the single shared store: priority lists, the scheduled
//! sorted set, the dead-letter list, and the stats hashes all live here.
//! This crate only provides the connection plumbing: dialing the broker
//! with backoff at startup and probing its liveness afterwards.

mod connector;
mod error;
mod health;

pub use connector::{connect, connect_with_backoff, DialConfig};
pub use error::{BrokerError, BrokerResult};
pub use health::{ping, probe, BrokerHealth};

// Re-export the connection handle the rest of the workspace passes around
pub use redis::aio::ConnectionManager;
