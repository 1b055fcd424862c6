//! Estimator event loop.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use pmm_bus::EventBus;

use crate::estimator::ReferencePriceEstimator;

/// Drive the estimator from the market-data channels until shutdown.
///
/// Each accepted sample that clears the emission gate is published as a
/// `PriceUpdate`.
pub async fn run_estimator(
    mut estimator: ReferencePriceEstimator,
    bus: Arc<EventBus>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut trades = bus.trades();
    let mut book_updates = bus.book_updates();

    info!("reference price estimator started");
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            event = trades.recv() => {
                let Some(event) = event else { break };
                if let Some(update) = estimator.on_trade(&event.payload) {
                    debug!(value = %update.value, "publishing reference price");
                    bus.publish_price_update(update);
                }
            }
            event = book_updates.recv() => {
                let Some(event) = event else { break };
                if let Some(update) = estimator.on_book_update(&event.payload) {
                    debug!(value = %update.value, "publishing reference price");
                    bus.publish_price_update(update);
                }
            }
        }
    }
    info!("reference price estimator stopped");
}
