//! Risk gate event loop.
//!
//! Sits between the decision channel and the execution channel: approved
//! decisions are republished for the execution engine, dropped ones are
//! counted. Fills and price updates feed the periodic breach checks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use pmm_bus::EventBus;
use pmm_orders::OrderManager;
use pmm_telemetry::metrics;

use crate::gate::{GateVerdict, RiskGate, RiskOutcome};

/// Drive the risk gate until shutdown.
pub async fn run_risk_gate(
    mut gate: RiskGate,
    manager: Arc<OrderManager>,
    bus: Arc<EventBus>,
    check_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut decisions = bus.decisions();
    let mut price_updates = bus.price_updates();
    let mut order_state = bus.order_state();
    let mut emergency_stops = bus.emergency_stops();
    let mut check = tokio::time::interval(check_interval);
    check.tick().await;

    info!("risk gate started");
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            event = decisions.recv() => {
                let Some(event) = event else { break };
                let decision = event.payload;
                let verdict = gate.screen(
                    &decision,
                    manager.active_order_count(),
                    |id| manager.get(id),
                );
                match verdict {
                    GateVerdict::Approve => {
                        bus.publish_approved_decision(decision);
                    }
                    GateVerdict::Drop(kind) => {
                        metrics::RISK_BLOCKED_TOTAL
                            .with_label_values(&[kind.as_str()])
                            .inc();
                        debug!(%decision, reason = kind.as_str(), "decision dropped by risk gate");
                    }
                }
            }
            event = price_updates.recv() => {
                let Some(event) = event else { break };
                gate.on_price(event.payload.value);
            }
            event = order_state.recv() => {
                let Some(event) = event else { break };
                let change = event.payload;
                if !change.fill_delta.is_zero() {
                    if let Some(price) = change.fill_price {
                        gate.on_fill(change.order.side, price, change.fill_delta);
                    }
                }
            }
            event = emergency_stops.recv() => {
                let Some(_) = event else { break };
                gate.set_emergency();
            }
            _ = check.tick() => {
                for outcome in gate.periodic_check() {
                    match outcome {
                        RiskOutcome::Alert(alert) => {
                            bus.publish_risk_alert(alert);
                        }
                        RiskOutcome::Emergency(stop) => {
                            bus.publish_emergency_stop(stop);
                        }
                    }
                }
            }
        }
    }
    info!("risk gate stopped");
}
