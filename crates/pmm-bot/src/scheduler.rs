//! Periodic reset scheduler.
//!
//! Emits `ResetTick` on a fixed cadence. The scheduler never cancels
//! anything itself; the strategy engine translates the tick into cancels.
//! A tick is skipped, not queued, while the previous tick's cancel cascade
//! is still draining.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info};

use pmm_bus::EventBus;
use pmm_core::ResetTick;
use pmm_orders::OrderManager;
use pmm_telemetry::metrics;

/// Drive the reset cadence until shutdown.
pub async fn run_reset_scheduler(
    manager: Arc<OrderManager>,
    bus: Arc<EventBus>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticks = tokio::time::interval(interval);
    ticks.tick().await;

    let mut emitted: u64 = 0;
    let mut coalesced: u64 = 0;

    info!(interval_secs = interval.as_secs(), "reset scheduler started");
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticks.tick() => {
                if manager.has_pending_cancels() {
                    coalesced += 1;
                    metrics::RESET_TICKS_COALESCED.inc();
                    debug!(coalesced, "previous reset still draining, skipping tick");
                    continue;
                }
                emitted += 1;
                info!(emitted, coalesced, "emitting reset tick");
                bus.publish_reset_tick(ResetTick {
                    at_ms: Utc::now().timestamp_millis() as u64,
                });
            }
        }
    }
    info!(emitted, coalesced, "reset scheduler stopped");
}
