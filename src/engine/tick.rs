//! Tick driver: the process heartbeat. Spawned once at startup.

use crate::engine::context::CompanionEngine;
use std::sync::Arc;
use std::time::Duration;

/// Fixed-delay evaluation loop. A failed tick is logged and skipped; this
/// is the only heartbeat the process has, so it never returns.
pub async fn run(engine: Arc<CompanionEngine>) {
    let interval = Duration::from_secs(engine.config().tick_interval_secs);
    tracing::info!("[Tick] Driver started, interval {:?}", interval);
    loop {
        tokio::time::sleep(interval).await;
        if let Err(e) = engine.tick().await {
            tracing::error!("[Tick] Tick failed: {:#}", e);
        }
    }
}
