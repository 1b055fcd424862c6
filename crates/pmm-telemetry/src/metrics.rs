//! Prometheus metrics for the market-making engine.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent
//! failure. These panics only occur during static initialization, never at
//! runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_int_counter, register_int_gauge, CounterVec,
    Gauge, IntCounter, IntGauge,
};

/// Market data samples dropped by the estimator.
/// Labels: reason (outlier/out_of_order)
pub static PRICE_SAMPLES_DROPPED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmm_price_samples_dropped_total",
        "Market data samples dropped by the reference price estimator",
        &["reason"]
    )
    .unwrap()
});

/// Most recently emitted reference price.
pub static REFERENCE_PRICE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "pmm_reference_price",
        "Most recently emitted reference price"
    )
    .unwrap()
});

/// Strategy decisions emitted, by kind.
pub static DECISIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmm_decisions_total",
        "Strategy decisions emitted",
        &["kind"]
    )
    .unwrap()
});

/// Decisions dropped by the risk gate, by reason.
pub static RISK_BLOCKED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmm_risk_blocked_total",
        "Decisions dropped by the risk gate",
        &["reason"]
    )
    .unwrap()
});

/// Exchange call retries, by operation.
pub static EXEC_RETRIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmm_exec_retries_total",
        "Exchange call retries",
        &["operation"]
    )
    .unwrap()
});

/// Bus events dropped on overflow.
pub static BUS_OVERFLOW_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmm_bus_overflow_total",
        "Events dropped from bounded bus channels",
        &["channel"]
    )
    .unwrap()
});

/// Currently tracked non-terminal orders.
pub static ACTIVE_ORDERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("pmm_active_orders", "Currently tracked non-terminal orders").unwrap()
});

/// Amendments currently awaiting exchange confirmation.
pub static AMENDS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "pmm_amends_in_flight",
        "Amendments awaiting exchange confirmation"
    )
    .unwrap()
});

/// Reset ticks skipped because the previous cascade was still draining.
pub static RESET_TICKS_COALESCED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "pmm_reset_ticks_coalesced_total",
        "Reset ticks skipped while a previous cancel cascade was draining"
    )
    .unwrap()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once() {
        // Touch every static; duplicate registration would panic here.
        PRICE_SAMPLES_DROPPED.with_label_values(&["outlier"]).inc();
        REFERENCE_PRICE.set(1.0);
        DECISIONS_TOTAL.with_label_values(&["place"]).inc();
        RISK_BLOCKED_TOTAL.with_label_values(&["position"]).inc();
        EXEC_RETRIES_TOTAL.with_label_values(&["place"]).inc();
        BUS_OVERFLOW_TOTAL.with_label_values(&["decisions"]).inc();
        ACTIVE_ORDERS.set(0);
        AMENDS_IN_FLIGHT.set(0);
        RESET_TICKS_COALESCED.inc();
    }
}
