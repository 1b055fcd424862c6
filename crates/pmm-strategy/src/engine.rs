//! Decision generation.
//!
//! The engine is pure over its inputs: given the reference price and a
//! snapshot of live orders it emits decisions, and never retries: a
//! rejected decision comes back as a state change and is re-planned on the
//! next trigger.

use rust_decimal::Decimal;
use tracing::debug;

use pmm_core::{Decision, Order, OrderSide, Price, PriceUpdate, Qty};

use crate::config::StrategyConfig;

/// One desired resting slot on a side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    price: Price,
    quantity: Qty,
}

/// Placements emitted but not yet registered by the order manager.
///
/// Terminal events can arrive back-to-back; without this the second
/// trigger would see an empty book and top the side up twice.
#[derive(Debug, Default, Clone, Copy)]
struct PendingPlaces {
    buy: usize,
    sell: usize,
}

impl PendingPlaces {
    fn get(&self, side: OrderSide) -> usize {
        match side {
            OrderSide::Buy => self.buy,
            OrderSide::Sell => self.sell,
        }
    }

    fn bump(&mut self, side: OrderSide) {
        match side {
            OrderSide::Buy => self.buy += 1,
            OrderSide::Sell => self.sell += 1,
        }
    }

    fn settle(&mut self, side: OrderSide) {
        match side {
            OrderSide::Buy => self.buy = self.buy.saturating_sub(1),
            OrderSide::Sell => self.sell = self.sell.saturating_sub(1),
        }
    }
}

/// The quoting strategy engine.
#[derive(Debug)]
pub struct StrategyEngine {
    config: StrategyConfig,
    last_cycle_ms: Option<u64>,
    last_price: Option<Price>,
    pending_places: PendingPlaces,
    emergency: bool,
}

impl StrategyEngine {
    pub fn new(config: StrategyConfig) -> Self {
        Self {
            config,
            last_cycle_ms: None,
            last_price: None,
            pending_places: PendingPlaces::default(),
            emergency: false,
        }
    }

    /// The order manager registered a placement this engine emitted.
    pub fn on_place_registered(&mut self, side: OrderSide) {
        self.pending_places.settle(side);
    }

    /// Enter emergency mode: from here on only cancels are emitted.
    pub fn set_emergency(&mut self) {
        self.emergency = true;
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency
    }

    /// Most recent reference price this engine evaluated against.
    pub fn last_price(&self) -> Option<Price> {
        self.last_price
    }

    /// Price-update trigger.
    ///
    /// Two consecutive cycles are separated by at least
    /// `rebalance_interval` unless the update carries drift at or above
    /// `drift_threshold`; drift has precedence.
    pub fn on_price_update(
        &mut self,
        update: &PriceUpdate,
        live: &[Order],
        amend_capacity: usize,
    ) -> Vec<Decision> {
        let drift = self
            .last_price
            .and_then(|last| update.value.frac_from(last));

        if let (Some(last_ms), Some(drift)) = (self.last_cycle_ms, drift) {
            let elapsed_ms = update.timestamp_ms.saturating_sub(last_ms);
            let interval_ms = (self.config.rebalance_interval * 1000.0) as u64;
            if elapsed_ms < interval_ms && drift < self.config.drift_threshold {
                debug!(elapsed_ms, %drift, "skipping evaluation cycle");
                return Vec::new();
            }
        }

        self.last_cycle_ms = Some(update.timestamp_ms);
        self.last_price = Some(update.value);
        // Cycle boundary: anything emitted a full cycle ago has either
        // registered or been dropped, so the in-flight count starts fresh.
        self.pending_places = PendingPlaces::default();
        self.evaluate(update.value, live, amend_capacity)
    }

    /// Terminal-order trigger: a slot opened up, refill it against the last
    /// known reference price. Not subject to the rebalance gate.
    pub fn on_order_terminal(&mut self, live: &[Order], amend_capacity: usize) -> Vec<Decision> {
        let Some(price) = self.last_price else {
            return Vec::new();
        };
        self.evaluate(price, live, amend_capacity)
    }

    /// Reset trigger: cancel every order that is not already terminal or
    /// cancelling, regardless of drift. Top-up happens on the following
    /// cycle once the cancels resolve.
    pub fn on_reset_tick(&mut self, non_terminal: &[Order]) -> Vec<Decision> {
        non_terminal
            .iter()
            .filter(|o| o.is_live())
            .map(|o| Decision::Cancel {
                client_order_id: o.client_order_id.clone(),
            })
            .collect()
    }

    fn evaluate(&mut self, price: Price, live: &[Order], amend_capacity: usize) -> Vec<Decision> {
        if self.emergency {
            return live
                .iter()
                .filter(|o| o.is_live())
                .map(|o| Decision::Cancel {
                    client_order_id: o.client_order_id.clone(),
                })
                .collect();
        }

        let mut decisions = Vec::new();
        let mut amend_budget = amend_capacity;
        for side in [OrderSide::Buy, OrderSide::Sell] {
            self.evaluate_side(side, price, live, &mut amend_budget, &mut decisions);
        }
        decisions
    }

    fn evaluate_side(
        &mut self,
        side: OrderSide,
        price: Price,
        live: &[Order],
        amend_budget: &mut usize,
        out: &mut Vec<Decision>,
    ) {
        let slots = self.desired_slots(side, price);

        let mut orders: Vec<&Order> = live
            .iter()
            .filter(|o| o.side == side && o.is_live())
            .collect();
        orders.sort_by_key(|o| o.price);

        // Pair each order with the nearest slot in price order; extras are
        // cancelled, unfilled slots are topped up.
        for (order, slot) in orders.iter().zip(slots.iter()) {
            let Some(deviation) = order.price.frac_from(slot.price) else {
                continue;
            };

            if deviation <= self.config.modify_threshold {
                continue;
            }
            if order.status != pmm_core::OrderStatus::Active {
                // An ack or modification is already in flight; re-plan once
                // it resolves.
                continue;
            }
            if deviation <= self.config.max_modify_deviation {
                if *amend_budget > 0 {
                    *amend_budget -= 1;
                    out.push(Decision::Amend {
                        client_order_id: order.client_order_id.clone(),
                        new_price: slot.price,
                        new_quantity: slot.quantity,
                    });
                } else {
                    // Amend capacity exhausted: shed the order now, the
                    // replacement is placed next cycle.
                    out.push(Decision::Cancel {
                        client_order_id: order.client_order_id.clone(),
                    });
                }
            } else {
                out.push(Decision::Cancel {
                    client_order_id: order.client_order_id.clone(),
                });
            }
        }

        for order in orders.iter().skip(slots.len()) {
            out.push(Decision::Cancel {
                client_order_id: order.client_order_id.clone(),
            });
        }

        let occupied = orders.len() + self.pending_places.get(side);
        for slot in slots.iter().skip(occupied) {
            self.pending_places.bump(side);
            out.push(Decision::Place {
                side,
                price: slot.price,
                quantity: slot.quantity,
            });
        }
    }

    /// Desired slot prices, spread evenly inside the band. For a single
    /// slot this is the band midpoint offset `(min_spread+max_spread)/2`.
    fn desired_slots(&self, side: OrderSide, price: Price) -> Vec<Slot> {
        let n = self.config.target_orders_per_side;
        let band = self.config.max_spread - self.config.min_spread;
        let mut slots = Vec::with_capacity(n);

        for i in 0..n {
            let offset = self.config.min_spread
                + band * Decimal::from(2 * i as u64 + 1) / Decimal::from(2 * n as u64);
            let raw = match side {
                OrderSide::Sell => price * (Decimal::ONE + offset),
                OrderSide::Buy => price * (Decimal::ONE - offset),
            };
            let slot_price = match side {
                OrderSide::Sell => raw.ceil_to_tick(self.config.tick_size),
                OrderSide::Buy => raw.floor_to_tick(self.config.tick_size),
            };
            slots.push(Slot {
                price: slot_price,
                quantity: Qty::for_min_value(self.config.min_order_value, slot_price),
            });
        }

        slots.sort_by_key(|s| s.price);
        slots
    }
}
