//! Drudge Worker - Entry Point
//!
//! Background worker that drains jobs from the broker's priority queues.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    drudge_worker::run().await
}
