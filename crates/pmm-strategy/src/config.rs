//! Strategy configuration (`[strategy]` section).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pmm_core::Price;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Trading pair id.
    pub symbol: String,
    /// Inner band edge, fraction of reference price.
    #[serde(default = "default_min_spread")]
    pub min_spread: Decimal,
    /// Outer band edge, fraction of reference price.
    #[serde(default = "default_max_spread")]
    pub max_spread: Decimal,
    /// Quote-currency floor per order.
    #[serde(default = "default_min_order_value")]
    pub min_order_value: Decimal,
    /// Desired live orders per side.
    #[serde(default = "default_target_orders_per_side")]
    pub target_orders_per_side: usize,
    /// Price drift that bypasses the rebalance cadence.
    #[serde(default = "default_drift_threshold")]
    pub drift_threshold: Decimal,
    /// Minimum gap between evaluation cycles, seconds.
    #[serde(default = "default_rebalance_interval")]
    pub rebalance_interval: f64,
    /// Deviation at or under this fraction leaves the order untouched.
    #[serde(default = "default_modify_threshold")]
    pub modify_threshold: Decimal,
    /// Deviation above this fraction cancels instead of amending.
    #[serde(default = "default_max_modify_deviation")]
    pub max_modify_deviation: Decimal,
    /// Exchange price tick.
    #[serde(default = "default_tick_size")]
    pub tick_size: Price,
}

fn default_min_spread() -> Decimal {
    Decimal::new(2, 3) // 0.002
}

fn default_max_spread() -> Decimal {
    Decimal::new(4, 3) // 0.004
}

fn default_min_order_value() -> Decimal {
    Decimal::from(10_000)
}

fn default_target_orders_per_side() -> usize {
    1
}

fn default_drift_threshold() -> Decimal {
    Decimal::new(5, 3) // 0.005
}

fn default_rebalance_interval() -> f64 {
    5.0
}

fn default_modify_threshold() -> Decimal {
    Decimal::new(3, 3) // 0.003
}

fn default_max_modify_deviation() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_tick_size() -> Price {
    Price::new(Decimal::new(1, 2)) // 0.01
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            min_spread: default_min_spread(),
            max_spread: default_max_spread(),
            min_order_value: default_min_order_value(),
            target_orders_per_side: default_target_orders_per_side(),
            drift_threshold: default_drift_threshold(),
            rebalance_interval: default_rebalance_interval(),
            modify_threshold: default_modify_threshold(),
            max_modify_deviation: default_max_modify_deviation(),
            tick_size: default_tick_size(),
        }
    }
}

impl StrategyConfig {
    /// Startup validation; a bad band makes the engine unstartable.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_spread <= Decimal::ZERO || self.max_spread <= self.min_spread {
            return Err(format!(
                "spread band [{}, {}] is not ordered",
                self.min_spread, self.max_spread
            ));
        }
        if self.modify_threshold > self.max_modify_deviation {
            return Err(format!(
                "modify_threshold {} exceeds max_modify_deviation {}",
                self.modify_threshold, self.max_modify_deviation
            ));
        }
        if self.target_orders_per_side == 0 {
            return Err("target_orders_per_side must be at least 1".to_string());
        }
        if self.min_order_value <= Decimal::ZERO {
            return Err("min_order_value must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_validates() {
        assert!(StrategyConfig::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_band_rejected() {
        let config = StrategyConfig {
            min_spread: dec!(0.004),
            max_spread: dec!(0.002),
            ..StrategyConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_modify_thresholds_rejected() {
        let config = StrategyConfig {
            modify_threshold: dec!(0.02),
            max_modify_deviation: dec!(0.01),
            ..StrategyConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
