//! Decision screening and breach escalation.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use pmm_core::{
    Decision, EmergencyStop, Order, OrderSide, Price, Qty, RiskAlert, RiskAlertKind,
};

use crate::config::RiskConfig;
use crate::inventory::Inventory;

/// Result of screening one decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    Approve,
    Drop(RiskAlertKind),
}

/// Result of a periodic risk check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskOutcome {
    Alert(RiskAlert),
    Emergency(EmergencyStop),
}

/// The risk gate.
#[derive(Debug)]
pub struct RiskGate {
    config: RiskConfig,
    inventory: Inventory,
    last_price: Option<Price>,
    prev_check_price: Option<Price>,
    consecutive_price_breaches: u32,
    emergency: bool,
}

impl RiskGate {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            inventory: Inventory::new(),
            last_price: None,
            prev_check_price: None,
            consecutive_price_breaches: 0,
            emergency: false,
        }
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency
    }

    /// Latch emergency mode (also raised externally on the bus).
    pub fn set_emergency(&mut self) {
        self.emergency = true;
    }

    pub fn position(&self) -> Decimal {
        self.inventory.net_size()
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.inventory.realized_pnl()
    }

    /// Track the latest reference price for the periodic move check.
    pub fn on_price(&mut self, price: Price) {
        self.last_price = Some(price);
    }

    /// Track a fill.
    pub fn on_fill(&mut self, side: OrderSide, price: Price, quantity: Qty) {
        self.inventory.record_fill(side, price, quantity);
    }

    /// Screen a decision. Cancels always pass; exposure-increasing
    /// decisions are dropped at the position cap; places are dropped at the
    /// order-count cap.
    pub fn screen(
        &self,
        decision: &Decision,
        active_order_count: usize,
        lookup: impl Fn(&pmm_core::ClientOrderId) -> Option<Order>,
    ) -> GateVerdict {
        if decision.is_cancel() {
            return GateVerdict::Approve;
        }
        if self.emergency {
            debug!(%decision, "emergency mode, only cancels pass");
            return GateVerdict::Drop(RiskAlertKind::PriceMove);
        }

        match decision {
            Decision::Place {
                side, quantity, ..
            } => {
                if self.would_increase_exposure(*side, quantity.inner()) {
                    return GateVerdict::Drop(RiskAlertKind::PositionLimit);
                }
                if active_order_count >= self.config.max_order_count {
                    return GateVerdict::Drop(RiskAlertKind::OrderCountLimit);
                }
                GateVerdict::Approve
            }
            Decision::Amend {
                client_order_id,
                new_quantity,
                ..
            } => {
                // A quantity-reducing amend always shrinks exposure.
                if let Some(order) = lookup(client_order_id) {
                    if *new_quantity <= order.original_quantity {
                        return GateVerdict::Approve;
                    }
                    let added = new_quantity.inner() - order.original_quantity.inner();
                    if self.would_increase_exposure(order.side, added) {
                        return GateVerdict::Drop(RiskAlertKind::PositionLimit);
                    }
                }
                GateVerdict::Approve
            }
            Decision::Cancel { .. } => GateVerdict::Approve,
        }
    }

    fn would_increase_exposure(&self, side: OrderSide, quantity: Decimal) -> bool {
        let position = self.inventory.net_size();
        let projected = position + Decimal::from(side.sign()) * quantity;
        projected.abs() > self.config.max_position && projected.abs() > position.abs()
    }

    /// Periodic check: price-move breach escalates to emergency when
    /// sustained over two consecutive checks, daily loss immediately.
    pub fn periodic_check(&mut self) -> Vec<RiskOutcome> {
        let mut outcomes = Vec::new();

        if let (Some(prev), Some(last)) = (self.prev_check_price, self.last_price) {
            match last.frac_from(prev) {
                Some(change) if change > self.config.max_price_change => {
                    self.consecutive_price_breaches += 1;
                    warn!(
                        %change,
                        breaches = self.consecutive_price_breaches,
                        "reference price moved beyond risk threshold"
                    );
                    outcomes.push(RiskOutcome::Alert(RiskAlert {
                        kind: RiskAlertKind::PriceMove,
                        detail: format!("price moved {change} over one check window"),
                    }));
                    if self.consecutive_price_breaches >= 2 {
                        self.emergency = true;
                        outcomes.push(RiskOutcome::Emergency(EmergencyStop {
                            reason: "sustained reference price move".to_string(),
                        }));
                    }
                }
                _ => self.consecutive_price_breaches = 0,
            }
        }
        self.prev_check_price = self.last_price;

        if self.inventory.realized_pnl() <= -self.config.max_daily_loss {
            self.emergency = true;
            outcomes.push(RiskOutcome::Alert(RiskAlert {
                kind: RiskAlertKind::DailyLoss,
                detail: format!("realized pnl {}", self.inventory.realized_pnl()),
            }));
            outcomes.push(RiskOutcome::Emergency(EmergencyStop {
                reason: "daily loss limit breached".to_string(),
            }));
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmm_core::ClientOrderId;
    use rust_decimal_macros::dec;

    fn config() -> RiskConfig {
        RiskConfig {
            max_position: dec!(1),
            max_order_count: 4,
            max_daily_loss: dec!(100),
            max_price_change: dec!(0.05),
            check_interval: 10,
        }
    }

    fn place(side: OrderSide, qty: Decimal) -> Decision {
        Decision::Place {
            side,
            price: Price::new(dec!(30000)),
            quantity: Qty::new(qty),
        }
    }

    fn no_lookup(_: &ClientOrderId) -> Option<Order> {
        None
    }

    #[test]
    fn test_cancel_always_passes() {
        let mut gate = RiskGate::new(config());
        gate.emergency = true;
        let cancel = Decision::Cancel {
            client_order_id: ClientOrderId::new(),
        };
        assert_eq!(gate.screen(&cancel, 1000, no_lookup), GateVerdict::Approve);
    }

    #[test]
    fn test_position_cap_drops_increasing_place() {
        let mut gate = RiskGate::new(config());
        gate.on_fill(OrderSide::Buy, Price::new(dec!(30000)), Qty::new(dec!(1)));

        assert_eq!(
            gate.screen(&place(OrderSide::Buy, dec!(0.5)), 0, no_lookup),
            GateVerdict::Drop(RiskAlertKind::PositionLimit)
        );
        // Selling reduces exposure: allowed.
        assert_eq!(
            gate.screen(&place(OrderSide::Sell, dec!(0.5)), 0, no_lookup),
            GateVerdict::Approve
        );
    }

    #[test]
    fn test_order_count_cap() {
        let gate = RiskGate::new(config());
        assert_eq!(
            gate.screen(&place(OrderSide::Buy, dec!(0.1)), 4, no_lookup),
            GateVerdict::Drop(RiskAlertKind::OrderCountLimit)
        );
        assert_eq!(
            gate.screen(&place(OrderSide::Buy, dec!(0.1)), 3, no_lookup),
            GateVerdict::Approve
        );
    }

    #[test]
    fn test_reducing_amend_passes_at_cap() {
        let mut gate = RiskGate::new(config());
        gate.on_fill(OrderSide::Buy, Price::new(dec!(30000)), Qty::new(dec!(1.5)));

        let mut order = Order::new(
            ClientOrderId::new(),
            "BTCUSDT".to_string(),
            OrderSide::Buy,
            Price::new(dec!(29910)),
            Qty::new(dec!(0.5)),
        );
        order.status = pmm_core::OrderStatus::Active;
        let id = order.client_order_id.clone();

        let shrink = Decision::Amend {
            client_order_id: id.clone(),
            new_price: Price::new(dec!(29900)),
            new_quantity: Qty::new(dec!(0.3)),
        };
        let grow = Decision::Amend {
            client_order_id: id,
            new_price: Price::new(dec!(29900)),
            new_quantity: Qty::new(dec!(2)),
        };
        let lookup = |_: &ClientOrderId| Some(order.clone());
        assert_eq!(gate.screen(&shrink, 0, lookup), GateVerdict::Approve);
        assert_eq!(
            gate.screen(&grow, 0, lookup),
            GateVerdict::Drop(RiskAlertKind::PositionLimit)
        );
    }

    #[test]
    fn test_price_breach_alerts_then_escalates() {
        let mut gate = RiskGate::new(config());
        gate.on_price(Price::new(dec!(30000)));
        assert!(gate.periodic_check().is_empty());

        // 10% jump: alert, not yet emergency.
        gate.on_price(Price::new(dec!(33000)));
        let outcomes = gate.periodic_check();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], RiskOutcome::Alert(_)));
        assert!(!gate.is_emergency());

        // Second consecutive breach: emergency.
        gate.on_price(Price::new(dec!(37000)));
        let outcomes = gate.periodic_check();
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, RiskOutcome::Emergency(_))));
        assert!(gate.is_emergency());
    }

    #[test]
    fn test_price_breach_counter_resets() {
        let mut gate = RiskGate::new(config());
        gate.on_price(Price::new(dec!(30000)));
        gate.periodic_check();

        gate.on_price(Price::new(dec!(33000)));
        assert_eq!(gate.periodic_check().len(), 1);

        // Calm window resets the streak.
        gate.on_price(Price::new(dec!(33010)));
        assert!(gate.periodic_check().is_empty());

        gate.on_price(Price::new(dec!(37000)));
        let outcomes = gate.periodic_check();
        assert_eq!(outcomes.len(), 1);
        assert!(!gate.is_emergency());
    }

    #[test]
    fn test_daily_loss_triggers_emergency() {
        let mut gate = RiskGate::new(config());
        gate.on_fill(OrderSide::Buy, Price::new(dec!(30000)), Qty::new(dec!(1)));
        gate.on_fill(OrderSide::Sell, Price::new(dec!(29800)), Qty::new(dec!(1)));
        assert_eq!(gate.realized_pnl(), dec!(-200));

        let outcomes = gate.periodic_check();
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, RiskOutcome::Emergency(_))));
        assert!(gate.is_emergency());
    }

    #[test]
    fn test_emergency_blocks_places() {
        let mut gate = RiskGate::new(config());
        gate.emergency = true;
        assert!(matches!(
            gate.screen(&place(OrderSide::Buy, dec!(0.1)), 0, no_lookup),
            GateVerdict::Drop(_)
        ));
    }
}
