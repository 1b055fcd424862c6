//! Position and realized-PnL tracking from fills.

use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;

use pmm_core::{OrderSide, Price, Qty};

/// Net position for the traded pair, with average-entry accounting.
///
/// Every fill is decomposed into a closing leg (offsetting the open
/// position, realizing PnL against the average entry) and an opening leg
/// (extending exposure in the fill's direction, blending the entry price).
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    /// Net position size (positive = long, negative = short).
    net_size: Decimal,
    /// Average entry price of the current position.
    avg_entry: Decimal,
    /// Fills processed.
    fill_count: u64,
    /// Realized PnL in quote currency.
    realized_pnl: Decimal,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fill and update position and realized PnL.
    pub fn record_fill(&mut self, side: OrderSide, price: Price, quantity: Qty) {
        let px = price.inner();
        let fill = Decimal::from(side.sign()) * quantity.inner();

        let (closing, opening) = self.split_fill(fill);

        if !closing.is_zero() {
            // Closing a long sells at px, closing a short buys at px.
            let pnl_per_unit = (px - self.avg_entry) * self.net_size.signum();
            self.realized_pnl += pnl_per_unit * closing;
        }

        let prior = self.net_size;
        self.net_size += fill;

        if self.net_size.is_zero() {
            self.avg_entry = Decimal::ZERO;
        } else if !opening.is_zero() {
            // The entry blends only over the exposure that survives the
            // fill; after a flip nothing carries over.
            let carried = if prior.signum() == self.net_size.signum() {
                prior.abs()
            } else {
                Decimal::ZERO
            };
            self.avg_entry =
                (self.avg_entry * carried + px * opening) / (carried + opening);
        }

        self.fill_count += 1;
    }

    /// Portion of `fill` that offsets the open position vs. the portion
    /// that adds exposure in the fill's direction.
    fn split_fill(&self, fill: Decimal) -> (Decimal, Decimal) {
        let offsets = self.net_size.signum() * fill.signum() < Decimal::ZERO;
        let closing = if offsets {
            fill.abs().min(self.net_size.abs())
        } else {
            Decimal::ZERO
        };
        (closing, fill.abs() - closing)
    }

    pub fn net_size(&self) -> Decimal {
        self.net_size
    }

    pub fn avg_entry(&self) -> Decimal {
        self.avg_entry
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    pub fn fill_count(&self) -> u64 {
        self.fill_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn buy(inv: &mut Inventory, price: Decimal, qty: Decimal) {
        inv.record_fill(OrderSide::Buy, Price::new(price), Qty::new(qty));
    }

    fn sell(inv: &mut Inventory, price: Decimal, qty: Decimal) {
        inv.record_fill(OrderSide::Sell, Price::new(price), Qty::new(qty));
    }

    #[test]
    fn test_first_fill_sets_entry() {
        let mut inv = Inventory::new();
        buy(&mut inv, dec!(100), dec!(1));
        assert_eq!(inv.net_size(), dec!(1));
        assert_eq!(inv.avg_entry(), dec!(100));
        assert_eq!(inv.fill_count(), 1);
    }

    #[test]
    fn test_building_long_position_averages_entry() {
        let mut inv = Inventory::new();
        buy(&mut inv, dec!(100), dec!(1));
        buy(&mut inv, dec!(110), dec!(1));
        assert_eq!(inv.net_size(), dec!(2));
        assert_eq!(inv.avg_entry(), dec!(105));
        assert_eq!(inv.realized_pnl(), dec!(0));
    }

    #[test]
    fn test_reducing_long_realizes_pnl() {
        let mut inv = Inventory::new();
        buy(&mut inv, dec!(100), dec!(2));
        sell(&mut inv, dec!(110), dec!(1));
        assert_eq!(inv.net_size(), dec!(1));
        assert_eq!(inv.realized_pnl(), dec!(10));
        // Entry unchanged while reducing.
        assert_eq!(inv.avg_entry(), dec!(100));
    }

    #[test]
    fn test_close_to_flat_clears_entry() {
        let mut inv = Inventory::new();
        buy(&mut inv, dec!(100), dec!(1));
        sell(&mut inv, dec!(104), dec!(1));
        assert_eq!(inv.net_size(), dec!(0));
        assert_eq!(inv.avg_entry(), dec!(0));
        assert_eq!(inv.realized_pnl(), dec!(4));
    }

    #[test]
    fn test_short_side_pnl() {
        let mut inv = Inventory::new();
        sell(&mut inv, dec!(100), dec!(1));
        buy(&mut inv, dec!(90), dec!(1));
        assert_eq!(inv.net_size(), dec!(0));
        assert_eq!(inv.realized_pnl(), dec!(10));
        assert_eq!(inv.avg_entry(), dec!(0));
    }

    #[test]
    fn test_position_flip_resets_entry() {
        let mut inv = Inventory::new();
        buy(&mut inv, dec!(100), dec!(1));
        sell(&mut inv, dec!(105), dec!(2));
        assert_eq!(inv.net_size(), dec!(-1));
        // Realized on the closed long leg only.
        assert_eq!(inv.realized_pnl(), dec!(5));
        assert_eq!(inv.avg_entry(), dec!(105));
    }

    #[test]
    fn test_losses_accumulate_negative() {
        let mut inv = Inventory::new();
        buy(&mut inv, dec!(100), dec!(1));
        sell(&mut inv, dec!(95), dec!(1));
        assert_eq!(inv.realized_pnl(), dec!(-5));
    }
}
