//! Order manager event loop.
//!
//! Single consumer of the exchange-response channel, so per-order responses
//! are applied in arrival order. Also runs the terminal-order sweep and the
//! stale-modification escalation timers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::info;

use pmm_bus::EventBus;

use crate::manager::OrderManager;

/// How often unresolved modifications are checked against the timeout.
const STALE_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Drive the order manager until shutdown.
pub async fn run_order_manager(
    manager: Arc<OrderManager>,
    bus: Arc<EventBus>,
    cleanup_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut exchange_events = bus.exchange_events();
    let mut cleanup = tokio::time::interval(cleanup_interval);
    let mut stale_check = tokio::time::interval(STALE_CHECK_INTERVAL);
    // The first interval tick fires immediately; skip it.
    cleanup.tick().await;
    stale_check.tick().await;

    info!("order manager started");
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            event = exchange_events.recv() => {
                let Some(event) = event else { break };
                manager.apply_exchange_event(&event.payload);
            }
            _ = cleanup.tick() => {
                manager.sweep_terminal();
            }
            _ = stale_check.tick() => {
                for cancel in manager.escalate_stale_modifications(Utc::now()) {
                    bus.publish_approved_decision(cancel);
                }
            }
        }
    }
    info!("order manager stopped");
}
