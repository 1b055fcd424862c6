//! The order manager: single owner of order state.
//!
//! All mutation happens under one non-suspending lock; every transition is
//! validated against the table in [`crate::machine`] and broadcast as an
//! `OrderStateChanged` snapshot. Illegal transitions quarantine the order
//! (a force-cancel is published) and the engine keeps running.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use pmm_bus::EventBus;
use pmm_core::{
    AmendTarget, ClientOrderId, Decision, ExchangeEvent, Order, OrderSide, OrderStateChanged,
    OrderStatus, Qty,
};
use pmm_telemetry::metrics;

use crate::config::OrderManagementConfig;
use crate::error::{OrderError, OrderResult};
use crate::history::HistoryRing;
use crate::machine::{transition, LifecycleEvent};

/// Archive bound for terminal orders.
const HISTORY_CAPACITY: usize = 2048;

/// Outcome of an amend submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmendSubmission {
    /// Amend accepted; the order is now `PendingAmend` and the exchange
    /// call should go out.
    Submitted(Order),
    /// Target equals the current price and quantity; nothing to send.
    NoChange,
}

/// Outcome of a cancel submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelSubmission {
    /// Cancel accepted; the order is now `PendingCancel`.
    Submitted(Order),
    /// A cancel is already outstanding; retransmit it to the exchange.
    Retry(Order),
}

#[derive(Debug)]
struct Inner {
    orders: HashMap<ClientOrderId, Order>,
    /// Secondary index: `(symbol, side, status)` -> client order ids.
    by_slot: HashMap<(String, OrderSide, OrderStatus), HashSet<ClientOrderId>>,
    amends_in_flight: usize,
    history: HistoryRing,
}

impl Inner {
    fn index(&mut self, order: &Order) {
        self.by_slot
            .entry((order.symbol.clone(), order.side, order.status))
            .or_default()
            .insert(order.client_order_id.clone());
    }

    fn unindex(&mut self, order: &Order, status: OrderStatus) {
        let key = (order.symbol.clone(), order.side, status);
        if let Some(set) = self.by_slot.get_mut(&key) {
            set.remove(&order.client_order_id);
            if set.is_empty() {
                self.by_slot.remove(&key);
            }
        }
    }

    fn non_terminal_count(&self) -> usize {
        self.orders
            .values()
            .filter(|o| !o.status.is_terminal())
            .count()
    }
}

/// Single source of truth for order lifecycle.
pub struct OrderManager {
    config: OrderManagementConfig,
    bus: Arc<EventBus>,
    inner: Mutex<Inner>,
}

impl OrderManager {
    pub fn new(config: OrderManagementConfig, bus: Arc<EventBus>) -> Self {
        Self {
            config,
            bus,
            inner: Mutex::new(Inner {
                orders: HashMap::new(),
                by_slot: HashMap::new(),
                amends_in_flight: 0,
                history: HistoryRing::new(HISTORY_CAPACITY),
            }),
        }
    }

    // === Submission paths (called by the execution engine) ===

    /// Register a freshly accepted `Place` as `PendingNew`.
    pub fn insert_pending(&self, order: Order) -> OrderResult<()> {
        let change = {
            let mut inner = self.inner.lock();
            if inner.orders.contains_key(&order.client_order_id) {
                return Err(OrderError::DuplicateOrder(order.client_order_id));
            }
            debug_assert_eq!(order.status, OrderStatus::PendingNew);
            inner.index(&order);
            inner
                .orders
                .insert(order.client_order_id.clone(), order.clone());
            metrics::ACTIVE_ORDERS.set(inner.non_terminal_count() as i64);
            OrderStateChanged {
                order,
                old_status: OrderStatus::PendingNew,
                fill_delta: Qty::ZERO,
                fill_price: None,
            }
        };
        self.bus.publish_order_state(change);
        Ok(())
    }

    /// Submit an amendment. Enforces one outstanding modification per order
    /// and the global amend cap.
    pub fn submit_amend(
        &self,
        id: &ClientOrderId,
        target: AmendTarget,
    ) -> OrderResult<AmendSubmission> {
        let change = {
            let mut inner = self.inner.lock();
            let existing = inner
                .orders
                .get(id)
                .ok_or_else(|| OrderError::UnknownOrder(id.clone()))?;

            if existing.status.has_pending_modification() {
                return Err(OrderError::ModificationPending(id.clone()));
            }
            let Some(next) = transition(existing.status, LifecycleEvent::AmendSubmitted) else {
                return Err(OrderError::InvalidState {
                    id: id.clone(),
                    status: existing.status,
                });
            };
            if existing.price == target.price && existing.original_quantity == target.quantity {
                return Ok(AmendSubmission::NoChange);
            }
            if inner.amends_in_flight >= self.config.max_pending_modifications {
                return Err(OrderError::AmendCapExceeded(inner.amends_in_flight));
            }

            let old_status = existing.status;
            let mut order = existing.clone();
            order.status = next;
            order.pending_amend = Some(target);
            order.update_time = Utc::now();
            order.last_event_time = order.update_time;

            inner.unindex(&order, old_status);
            inner.index(&order);
            inner.orders.insert(id.clone(), order.clone());
            inner.amends_in_flight += 1;
            metrics::AMENDS_IN_FLIGHT.set(inner.amends_in_flight as i64);

            OrderStateChanged {
                order: order.clone(),
                old_status,
                fill_delta: Qty::ZERO,
                fill_price: None,
            }
        };
        let order = change.order.clone();
        self.bus.publish_order_state(change);
        Ok(AmendSubmission::Submitted(order))
    }

    /// Submit a cancel. A repeated cancel on a `PendingCancel` order is a
    /// retransmission, not a second outstanding modification.
    pub fn submit_cancel(&self, id: &ClientOrderId) -> OrderResult<CancelSubmission> {
        let (change, submission) = {
            let mut inner = self.inner.lock();
            let order = inner
                .orders
                .get(id)
                .ok_or_else(|| OrderError::UnknownOrder(id.clone()))?;

            if order.status == OrderStatus::PendingCancel {
                let mut order = order.clone();
                order.update_time = Utc::now();
                inner.orders.insert(id.clone(), order.clone());
                return Ok(CancelSubmission::Retry(order));
            }
            let Some(next) = transition(order.status, LifecycleEvent::CancelSubmitted) else {
                return Err(OrderError::InvalidState {
                    id: id.clone(),
                    status: order.status,
                });
            };

            let old_status = order.status;
            let mut order = order.clone();
            // Cancelling a pending amend abandons the amend.
            if old_status == OrderStatus::PendingAmend {
                order.pending_amend = None;
                inner.amends_in_flight = inner.amends_in_flight.saturating_sub(1);
                metrics::AMENDS_IN_FLIGHT.set(inner.amends_in_flight as i64);
            }
            order.status = next;
            order.update_time = Utc::now();
            order.last_event_time = order.update_time;

            inner.unindex(&order, old_status);
            inner.index(&order);
            inner.orders.insert(id.clone(), order.clone());

            (
                OrderStateChanged {
                    order: order.clone(),
                    old_status,
                    fill_delta: Qty::ZERO,
                    fill_price: None,
                },
                CancelSubmission::Submitted(order),
            )
        };
        self.bus.publish_order_state(change);
        Ok(submission)
    }

    // === Exchange response path ===

    /// Apply an exchange response to the state machine.
    ///
    /// Responses for terminal or unknown orders are tolerated (at-least-once
    /// delivery); a response that is illegal for a live order quarantines it.
    pub fn apply_exchange_event(&self, event: &ExchangeEvent) {
        let id = event.client_order_id().clone();

        enum Outcome {
            Changed(OrderStateChanged),
            Quarantine(Order),
            Ignored,
        }

        let outcome = {
            let mut inner = self.inner.lock();
            let Some(order) = inner.orders.get(&id).cloned() else {
                error!(%id, "exchange response for unknown order");
                return;
            };

            if order.status.is_terminal() {
                // Late or duplicate delivery after the lifecycle ended.
                debug!(%id, status = %order.status, "ignoring response for terminal order");
                Outcome::Ignored
            } else {
                let old_status = order.status;
                let mut order = order;
                let mut fill_delta = Qty::ZERO;
                let mut fill_price = None;

                let lifecycle = match event {
                    ExchangeEvent::OrderAck { order_id, .. } => {
                        order.order_id = Some(order_id.clone());
                        Some(LifecycleEvent::Ack)
                    }
                    ExchangeEvent::OrderReject { reason, .. } => {
                        warn!(%id, %reason, "order rejected by exchange");
                        Some(LifecycleEvent::Reject)
                    }
                    ExchangeEvent::AmendAck { .. } => {
                        if order.status == OrderStatus::PendingAmend {
                            Some(LifecycleEvent::AmendAck)
                        } else {
                            // The amend became moot (e.g. a racing fill
                            // resolved it); nothing left to confirm.
                            debug!(%id, status = %order.status, "amend ack with no amend outstanding");
                            None
                        }
                    }
                    ExchangeEvent::AmendReject { reason, .. } => {
                        if order.status == OrderStatus::PendingAmend {
                            debug!(%id, %reason, "amend rejected, keeping resting order");
                            Some(LifecycleEvent::AmendReject)
                        } else {
                            debug!(%id, status = %order.status, "amend reject with no amend outstanding");
                            None
                        }
                    }
                    ExchangeEvent::CancelAck { .. } => Some(LifecycleEvent::CancelAck),
                    ExchangeEvent::CancelReject { reason, .. } => {
                        warn!(%id, %reason, "cancel rejected by exchange");
                        Some(LifecycleEvent::CancelReject)
                    }
                    ExchangeEvent::Fill {
                        quantity, price, ..
                    } => {
                        let remaining = order.remaining_quantity();
                        let delta = if *quantity > remaining {
                            remaining
                        } else {
                            *quantity
                        };
                        if delta.is_zero() {
                            debug!(%id, "ignoring fill for fully executed order");
                            None
                        } else {
                            fill_delta = delta;
                            fill_price = Some(*price);
                            let complete =
                                order.executed_quantity + delta >= order.original_quantity;
                            Some(if complete {
                                LifecycleEvent::CompleteFill
                            } else {
                                LifecycleEvent::PartialFill
                            })
                        }
                    }
                };

                match lifecycle {
                    None => Outcome::Ignored,
                    Some(lifecycle) => match transition(old_status, lifecycle) {
                        None => {
                            error!(
                                %id,
                                status = %old_status,
                                event = ?lifecycle,
                                "illegal order transition, quarantining order"
                            );
                            Outcome::Quarantine(order)
                        }
                        Some(next) => {
                            match lifecycle {
                                LifecycleEvent::AmendAck => {
                                    if let Some(target) = order.pending_amend.take() {
                                        order.price = target.price;
                                        order.original_quantity = target.quantity;
                                        // A fill during the amend window can
                                        // exceed the new quantity; the fill
                                        // stands.
                                        if order.executed_quantity > order.original_quantity {
                                            order.original_quantity = order.executed_quantity;
                                        }
                                    }
                                    order.amend_count += 1;
                                    order.last_amend_time = Some(Utc::now());
                                    inner.amends_in_flight =
                                        inner.amends_in_flight.saturating_sub(1);
                                }
                                LifecycleEvent::AmendReject => {
                                    order.pending_amend = None;
                                    inner.amends_in_flight =
                                        inner.amends_in_flight.saturating_sub(1);
                                }
                                LifecycleEvent::CompleteFill => {
                                    if order.status == OrderStatus::PendingAmend {
                                        // Amend is moot once nothing rests.
                                        order.pending_amend = None;
                                        inner.amends_in_flight =
                                            inner.amends_in_flight.saturating_sub(1);
                                    }
                                }
                                _ => {}
                            }
                            if !fill_delta.is_zero() {
                                order.executed_quantity = order.executed_quantity + fill_delta;
                            }

                            order.status = next;
                            order.update_time = Utc::now();
                            order.last_event_time = order.update_time;

                            inner.unindex(&order, old_status);
                            inner.index(&order);
                            inner.orders.insert(id.clone(), order.clone());
                            metrics::ACTIVE_ORDERS.set(inner.non_terminal_count() as i64);
                            metrics::AMENDS_IN_FLIGHT.set(inner.amends_in_flight as i64);

                            Outcome::Changed(OrderStateChanged {
                                order,
                                old_status,
                                fill_delta,
                                fill_price,
                            })
                        }
                    },
                }
            }
        };

        match outcome {
            Outcome::Changed(change) => {
                self.bus.publish_order_state(change);
            }
            Outcome::Quarantine(order) => {
                // Risk-exempt force cancel straight onto the execution
                // channel; the submit path performs the state transition.
                if order.status != OrderStatus::PendingCancel {
                    self.bus.publish_approved_decision(Decision::Cancel {
                        client_order_id: order.client_order_id,
                    });
                }
            }
            Outcome::Ignored => {}
        }
    }

    // === Maintenance ===

    /// Escalate modifications that have been unresolved for longer than
    /// `modification_timeout` into forced cancels.
    ///
    /// Returns the cancels to dispatch. Stale `PendingCancel` orders are
    /// retransmitted, stale `PendingAmend` orders are converted (the submit
    /// path abandons the amend).
    pub fn escalate_stale_modifications(&self, now: DateTime<Utc>) -> Vec<Decision> {
        let timeout = chrono::Duration::seconds(self.config.modification_timeout as i64);
        let stale: Vec<ClientOrderId> = {
            let inner = self.inner.lock();
            inner
                .orders
                .values()
                .filter(|o| o.status.has_pending_modification())
                .filter(|o| now - o.update_time >= timeout)
                .map(|o| o.client_order_id.clone())
                .collect()
        };

        stale
            .into_iter()
            .map(|id| {
                warn!(%id, "modification unresolved past timeout, forcing cancel");
                Decision::Cancel {
                    client_order_id: id,
                }
            })
            .collect()
    }

    /// Archive terminal orders into the history ring and free their index
    /// slots. Returns the number archived.
    pub fn sweep_terminal(&self) -> usize {
        let mut inner = self.inner.lock();
        let terminal: Vec<ClientOrderId> = inner
            .orders
            .values()
            .filter(|o| o.status.is_terminal())
            .map(|o| o.client_order_id.clone())
            .collect();

        let count = terminal.len();
        for id in terminal {
            if let Some(order) = inner.orders.remove(&id) {
                inner.unindex(&order, order.status);
                inner.history.push(order);
            }
        }
        if count > 0 {
            info!(archived = count, history = inner.history.len(), "terminal order sweep");
        }
        count
    }

    // === Read views (snapshots) ===

    pub fn get(&self, id: &ClientOrderId) -> Option<Order> {
        self.inner.lock().orders.get(id).cloned()
    }

    /// Orders still occupying (or about to occupy) a book slot, optionally
    /// filtered by side.
    pub fn live_orders(&self, side: Option<OrderSide>) -> Vec<Order> {
        let inner = self.inner.lock();
        inner
            .orders
            .values()
            .filter(|o| o.is_live())
            .filter(|o| side.map_or(true, |s| o.side == s))
            .cloned()
            .collect()
    }

    /// Every order that has not reached a terminal status.
    pub fn non_terminal_orders(&self) -> Vec<Order> {
        let inner = self.inner.lock();
        inner
            .orders
            .values()
            .filter(|o| !o.status.is_terminal())
            .cloned()
            .collect()
    }

    /// O(k) status-slot lookup through the secondary index.
    pub fn orders_in_slot(
        &self,
        symbol: &str,
        side: OrderSide,
        status: OrderStatus,
    ) -> Vec<Order> {
        let inner = self.inner.lock();
        inner
            .by_slot
            .get(&(symbol.to_string(), side, status))
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.orders.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn active_order_count(&self) -> usize {
        self.inner.lock().non_terminal_count()
    }

    pub fn amends_in_flight(&self) -> usize {
        self.inner.lock().amends_in_flight
    }

    pub fn amend_capacity_remaining(&self) -> usize {
        let inner = self.inner.lock();
        self.config
            .max_pending_modifications
            .saturating_sub(inner.amends_in_flight)
    }

    /// Whether any cancel is still draining (used to coalesce reset ticks).
    pub fn has_pending_cancels(&self) -> bool {
        let inner = self.inner.lock();
        inner
            .orders
            .values()
            .any(|o| o.status == OrderStatus::PendingCancel)
    }

    pub fn history_len(&self) -> usize {
        self.inner.lock().history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmm_core::Price;
    use rust_decimal_macros::dec;

    fn manager() -> (Arc<OrderManager>, Arc<EventBus>) {
        let bus = Arc::new(EventBus::default());
        let config = OrderManagementConfig {
            max_pending_modifications: 2,
            modification_timeout: 5,
            ..OrderManagementConfig::default()
        };
        (Arc::new(OrderManager::new(config, bus.clone())), bus)
    }

    fn place(mgr: &OrderManager, side: OrderSide, price: rust_decimal::Decimal) -> ClientOrderId {
        let order = Order::new(
            ClientOrderId::new(),
            "BTCUSDT".to_string(),
            side,
            Price::new(price),
            Qty::new(dec!(0.5)),
        );
        let id = order.client_order_id.clone();
        mgr.insert_pending(order).unwrap();
        id
    }

    fn ack(mgr: &OrderManager, id: &ClientOrderId, oid: &str) {
        mgr.apply_exchange_event(&ExchangeEvent::OrderAck {
            client_order_id: id.clone(),
            order_id: oid.to_string(),
        });
    }

    fn fill(mgr: &OrderManager, id: &ClientOrderId, qty: rust_decimal::Decimal) {
        mgr.apply_exchange_event(&ExchangeEvent::Fill {
            client_order_id: id.clone(),
            quantity: Qty::new(qty),
            price: Price::new(dec!(30000)),
            timestamp_ms: 1,
        });
    }

    #[test]
    fn test_place_ack_lifecycle() {
        let (mgr, _bus) = manager();
        let id = place(&mgr, OrderSide::Buy, dec!(29910));
        assert_eq!(mgr.get(&id).unwrap().status, OrderStatus::PendingNew);

        ack(&mgr, &id, "X-1");
        let order = mgr.get(&id).unwrap();
        assert_eq!(order.status, OrderStatus::Active);
        assert_eq!(order.order_id.as_deref(), Some("X-1"));
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let (mgr, _bus) = manager();
        let order = Order::new(
            ClientOrderId::new(),
            "BTCUSDT".to_string(),
            OrderSide::Buy,
            Price::new(dec!(100)),
            Qty::new(dec!(1)),
        );
        mgr.insert_pending(order.clone()).unwrap();
        assert!(matches!(
            mgr.insert_pending(order),
            Err(OrderError::DuplicateOrder(_))
        ));
    }

    #[test]
    fn test_partial_then_complete_fill() {
        let (mgr, _bus) = manager();
        let id = place(&mgr, OrderSide::Buy, dec!(29910));
        ack(&mgr, &id, "X-1");

        fill(&mgr, &id, dec!(0.2));
        let order = mgr.get(&id).unwrap();
        assert_eq!(order.status, OrderStatus::Active);
        assert_eq!(order.executed_quantity, Qty::new(dec!(0.2)));

        fill(&mgr, &id, dec!(0.3));
        let order = mgr.get(&id).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.executed_quantity, order.original_quantity);
    }

    #[test]
    fn test_overfill_clamped_to_original() {
        let (mgr, _bus) = manager();
        let id = place(&mgr, OrderSide::Buy, dec!(29910));
        ack(&mgr, &id, "X-1");

        fill(&mgr, &id, dec!(9));
        let order = mgr.get(&id).unwrap();
        // P1: executed can never exceed original.
        assert_eq!(order.executed_quantity, order.original_quantity);
        assert_eq!(order.status, OrderStatus::Filled);
    }

    #[test]
    fn test_amend_ack_applies_target_and_counts() {
        let (mgr, _bus) = manager();
        let id = place(&mgr, OrderSide::Sell, dec!(30090));
        ack(&mgr, &id, "X-1");

        let target = AmendTarget {
            price: Price::new(dec!(30120)),
            quantity: Qty::new(dec!(0.6)),
        };
        assert!(matches!(
            mgr.submit_amend(&id, target).unwrap(),
            AmendSubmission::Submitted(_)
        ));
        assert_eq!(mgr.get(&id).unwrap().status, OrderStatus::PendingAmend);
        assert_eq!(mgr.amends_in_flight(), 1);

        mgr.apply_exchange_event(&ExchangeEvent::AmendAck {
            client_order_id: id.clone(),
        });
        let order = mgr.get(&id).unwrap();
        assert_eq!(order.status, OrderStatus::Active);
        assert_eq!(order.price, Price::new(dec!(30120)));
        assert_eq!(order.original_quantity, Qty::new(dec!(0.6)));
        assert_eq!(order.amend_count, 1);
        assert!(order.pending_amend.is_none());
        assert!(order.last_amend_time.is_some());
        assert_eq!(mgr.amends_in_flight(), 0);
    }

    #[test]
    fn test_amend_reject_restores_active() {
        let (mgr, _bus) = manager();
        let id = place(&mgr, OrderSide::Sell, dec!(30090));
        ack(&mgr, &id, "X-1");

        let target = AmendTarget {
            price: Price::new(dec!(30120)),
            quantity: Qty::new(dec!(0.5)),
        };
        mgr.submit_amend(&id, target).unwrap();
        mgr.apply_exchange_event(&ExchangeEvent::AmendReject {
            client_order_id: id.clone(),
            reason: "price out of bounds".to_string(),
        });

        let order = mgr.get(&id).unwrap();
        assert_eq!(order.status, OrderStatus::Active);
        assert_eq!(order.price, Price::new(dec!(30090)));
        assert_eq!(order.amend_count, 0);
        assert!(order.pending_amend.is_none());
        assert_eq!(mgr.amends_in_flight(), 0);
    }

    #[test]
    fn test_amend_noop_detected() {
        let (mgr, _bus) = manager();
        let id = place(&mgr, OrderSide::Sell, dec!(30090));
        ack(&mgr, &id, "X-1");

        let target = AmendTarget {
            price: Price::new(dec!(30090)),
            quantity: Qty::new(dec!(0.5)),
        };
        assert_eq!(mgr.submit_amend(&id, target).unwrap(), AmendSubmission::NoChange);
        assert_eq!(mgr.get(&id).unwrap().status, OrderStatus::Active);
        assert_eq!(mgr.amends_in_flight(), 0);
    }

    #[test]
    fn test_second_amend_on_pending_order_rejected() {
        let (mgr, _bus) = manager();
        let id = place(&mgr, OrderSide::Sell, dec!(30090));
        ack(&mgr, &id, "X-1");

        let target = AmendTarget {
            price: Price::new(dec!(30120)),
            quantity: Qty::new(dec!(0.5)),
        };
        mgr.submit_amend(&id, target).unwrap();
        // P3: one outstanding modification per order.
        assert!(matches!(
            mgr.submit_amend(&id, target),
            Err(OrderError::ModificationPending(_))
        ));
    }

    #[test]
    fn test_global_amend_cap() {
        let (mgr, _bus) = manager();
        let ids: Vec<ClientOrderId> = (0..3)
            .map(|i| {
                let id = place(&mgr, OrderSide::Sell, dec!(30090) + rust_decimal::Decimal::from(i));
                ack(&mgr, &id, &format!("X-{i}"));
                id
            })
            .collect();

        let target = |p| AmendTarget {
            price: Price::new(p),
            quantity: Qty::new(dec!(0.5)),
        };
        mgr.submit_amend(&ids[0], target(dec!(30200))).unwrap();
        mgr.submit_amend(&ids[1], target(dec!(30201))).unwrap();
        // P4: the third is refused at the cap of 2.
        assert!(matches!(
            mgr.submit_amend(&ids[2], target(dec!(30202))),
            Err(OrderError::AmendCapExceeded(2))
        ));
        assert_eq!(mgr.amend_capacity_remaining(), 0);
    }

    #[test]
    fn test_fill_during_pending_amend_then_reject_keeps_fill() {
        let (mgr, _bus) = manager();
        let id = place(&mgr, OrderSide::Sell, dec!(30090));
        ack(&mgr, &id, "X-1");
        mgr.submit_amend(
            &id,
            AmendTarget {
                price: Price::new(dec!(30120)),
                quantity: Qty::new(dec!(0.5)),
            },
        )
        .unwrap();

        fill(&mgr, &id, dec!(0.2));
        let order = mgr.get(&id).unwrap();
        assert_eq!(order.status, OrderStatus::PendingAmend);
        assert_eq!(order.executed_quantity, Qty::new(dec!(0.2)));

        mgr.apply_exchange_event(&ExchangeEvent::AmendReject {
            client_order_id: id.clone(),
            reason: "too late".to_string(),
        });
        let order = mgr.get(&id).unwrap();
        assert_eq!(order.status, OrderStatus::Active);
        // The fill stands.
        assert_eq!(order.executed_quantity, Qty::new(dec!(0.2)));
    }

    #[test]
    fn test_complete_fill_during_pending_amend_releases_cap() {
        let (mgr, _bus) = manager();
        let id = place(&mgr, OrderSide::Sell, dec!(30090));
        ack(&mgr, &id, "X-1");
        mgr.submit_amend(
            &id,
            AmendTarget {
                price: Price::new(dec!(30120)),
                quantity: Qty::new(dec!(0.5)),
            },
        )
        .unwrap();
        assert_eq!(mgr.amends_in_flight(), 1);

        fill(&mgr, &id, dec!(0.5));
        assert_eq!(mgr.get(&id).unwrap().status, OrderStatus::Filled);
        assert_eq!(mgr.amends_in_flight(), 0);

        // The straggling reject is a no-op.
        mgr.apply_exchange_event(&ExchangeEvent::AmendReject {
            client_order_id: id.clone(),
            reason: "filled".to_string(),
        });
        assert_eq!(mgr.get(&id).unwrap().status, OrderStatus::Filled);
    }

    #[test]
    fn test_cancel_lifecycle() {
        let (mgr, _bus) = manager();
        let id = place(&mgr, OrderSide::Buy, dec!(29910));
        ack(&mgr, &id, "X-1");

        assert!(matches!(
            mgr.submit_cancel(&id).unwrap(),
            CancelSubmission::Submitted(_)
        ));
        assert_eq!(mgr.get(&id).unwrap().status, OrderStatus::PendingCancel);

        // Repeat is a retransmission, not a new modification.
        assert!(matches!(
            mgr.submit_cancel(&id).unwrap(),
            CancelSubmission::Retry(_)
        ));

        mgr.apply_exchange_event(&ExchangeEvent::CancelAck {
            client_order_id: id.clone(),
        });
        assert_eq!(mgr.get(&id).unwrap().status, OrderStatus::Cancelled);
    }

    #[test]
    fn test_cancel_reject_restores_active() {
        let (mgr, _bus) = manager();
        let id = place(&mgr, OrderSide::Buy, dec!(29910));
        ack(&mgr, &id, "X-1");
        mgr.submit_cancel(&id).unwrap();

        mgr.apply_exchange_event(&ExchangeEvent::CancelReject {
            client_order_id: id.clone(),
            reason: "unknown order".to_string(),
        });
        assert_eq!(mgr.get(&id).unwrap().status, OrderStatus::Active);
    }

    #[test]
    fn test_cancel_of_pending_amend_abandons_amend() {
        let (mgr, _bus) = manager();
        let id = place(&mgr, OrderSide::Sell, dec!(30090));
        ack(&mgr, &id, "X-1");
        mgr.submit_amend(
            &id,
            AmendTarget {
                price: Price::new(dec!(30120)),
                quantity: Qty::new(dec!(0.5)),
            },
        )
        .unwrap();
        assert_eq!(mgr.amends_in_flight(), 1);

        mgr.submit_cancel(&id).unwrap();
        let order = mgr.get(&id).unwrap();
        assert_eq!(order.status, OrderStatus::PendingCancel);
        assert!(order.pending_amend.is_none());
        assert_eq!(mgr.amends_in_flight(), 0);
    }

    #[test]
    fn test_stale_modification_escalates() {
        let (mgr, _bus) = manager();
        let id = place(&mgr, OrderSide::Sell, dec!(30090));
        ack(&mgr, &id, "X-1");
        mgr.submit_amend(
            &id,
            AmendTarget {
                price: Price::new(dec!(30120)),
                quantity: Qty::new(dec!(0.5)),
            },
        )
        .unwrap();

        // Not yet stale.
        assert!(mgr.escalate_stale_modifications(Utc::now()).is_empty());

        let later = Utc::now() + chrono::Duration::seconds(10);
        let cancels = mgr.escalate_stale_modifications(later);
        assert_eq!(cancels.len(), 1);
        assert!(matches!(cancels[0], Decision::Cancel { .. }));
    }

    #[test]
    fn test_sweep_archives_terminal() {
        let (mgr, _bus) = manager();
        let id = place(&mgr, OrderSide::Buy, dec!(29910));
        ack(&mgr, &id, "X-1");
        fill(&mgr, &id, dec!(0.5));

        let live = place(&mgr, OrderSide::Sell, dec!(30090));

        assert_eq!(mgr.sweep_terminal(), 1);
        assert!(mgr.get(&id).is_none());
        assert!(mgr.get(&live).is_some());
        assert_eq!(mgr.history_len(), 1);
    }

    #[test]
    fn test_secondary_index_follows_status() {
        let (mgr, _bus) = manager();
        let id = place(&mgr, OrderSide::Buy, dec!(29910));
        assert_eq!(
            mgr.orders_in_slot("BTCUSDT", OrderSide::Buy, OrderStatus::PendingNew)
                .len(),
            1
        );
        ack(&mgr, &id, "X-1");
        assert!(mgr
            .orders_in_slot("BTCUSDT", OrderSide::Buy, OrderStatus::PendingNew)
            .is_empty());
        assert_eq!(
            mgr.orders_in_slot("BTCUSDT", OrderSide::Buy, OrderStatus::Active)
                .len(),
            1
        );
    }

    #[test]
    fn test_live_orders_excludes_pending_cancel() {
        let (mgr, _bus) = manager();
        let id = place(&mgr, OrderSide::Buy, dec!(29910));
        ack(&mgr, &id, "X-1");
        assert_eq!(mgr.live_orders(Some(OrderSide::Buy)).len(), 1);

        mgr.submit_cancel(&id).unwrap();
        assert!(mgr.live_orders(Some(OrderSide::Buy)).is_empty());
        assert!(mgr.has_pending_cancels());
    }

    #[test]
    fn test_quarantine_on_illegal_transition() {
        let (mgr, bus) = manager();
        let mut approved = bus.approved_decisions();

        let id = place(&mgr, OrderSide::Buy, dec!(29910));
        ack(&mgr, &id, "X-1");
        // CancelAck without a pending cancel is not a legal edge.
        mgr.apply_exchange_event(&ExchangeEvent::CancelAck {
            client_order_id: id.clone(),
        });

        // The order is quarantined via a force-cancel on the execution channel.
        let decision = approved.try_recv().unwrap().payload;
        assert_eq!(
            decision,
            Decision::Cancel {
                client_order_id: id.clone()
            }
        );
        // Status untouched until the cancel path runs.
        assert_eq!(mgr.get(&id).unwrap().status, OrderStatus::Active);
    }
}
