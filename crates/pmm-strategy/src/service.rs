//! Strategy event loop.
//!
//! Subscribes to price updates, order-state changes and reset ticks, reads
//! the order manager's current view, and publishes decisions for the risk
//! gate to screen.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use pmm_bus::EventBus;
use pmm_core::Decision;
use pmm_orders::OrderManager;
use pmm_telemetry::metrics;

use crate::engine::StrategyEngine;

fn publish_all(bus: &EventBus, decisions: Vec<Decision>) {
    for decision in decisions {
        metrics::DECISIONS_TOTAL
            .with_label_values(&[decision.kind()])
            .inc();
        debug!(%decision, "publishing decision");
        bus.publish_decision(decision);
    }
}

/// Drive the strategy until shutdown.
pub async fn run_strategy(
    mut engine: StrategyEngine,
    manager: Arc<OrderManager>,
    bus: Arc<EventBus>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut price_updates = bus.price_updates();
    let mut order_state = bus.order_state();
    let mut reset_ticks = bus.reset_ticks();
    let mut emergency_stops = bus.emergency_stops();

    info!("strategy engine started");
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            event = price_updates.recv() => {
                let Some(event) = event else { break };
                let live = manager.live_orders(None);
                let capacity = manager.amend_capacity_remaining();
                let decisions = engine.on_price_update(&event.payload, &live, capacity);
                publish_all(&bus, decisions);
            }
            event = order_state.recv() => {
                let Some(event) = event else { break };
                if event.payload.order.status == pmm_core::OrderStatus::PendingNew {
                    engine.on_place_registered(event.payload.order.side);
                    continue;
                }
                // Only a slot opening up (an order going terminal) warrants
                // an immediate re-plan.
                if !event.payload.order.status.is_terminal() {
                    continue;
                }
                let live = manager.live_orders(None);
                let capacity = manager.amend_capacity_remaining();
                let decisions = engine.on_order_terminal(&live, capacity);
                publish_all(&bus, decisions);
            }
            event = reset_ticks.recv() => {
                let Some(_) = event else { break };
                let non_terminal = manager.non_terminal_orders();
                info!(orders = non_terminal.len(), "reset tick: flushing live pool");
                let decisions = engine.on_reset_tick(&non_terminal);
                publish_all(&bus, decisions);
            }
            event = emergency_stops.recv() => {
                let Some(event) = event else { break };
                warn!(reason = %event.payload.reason, "emergency stop: cancelling all orders");
                engine.set_emergency();
                let non_terminal = manager.non_terminal_orders();
                let decisions = engine.on_reset_tick(&non_terminal);
                publish_all(&bus, decisions);
            }
        }
    }
    info!("strategy engine stopped");
}
