//! Risk configuration (`[risk]` section).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Maximum absolute position, base units.
    #[serde(default = "default_max_position")]
    pub max_position: Decimal,
    /// Maximum tracked non-terminal orders.
    #[serde(default = "default_max_order_count")]
    pub max_order_count: usize,
    /// Maximum realized daily loss, quote currency.
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss: Decimal,
    /// Maximum reference-price move per check window, fraction.
    #[serde(default = "default_max_price_change")]
    pub max_price_change: Decimal,
    /// Periodic risk check cadence, seconds.
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
}

fn default_max_position() -> Decimal {
    Decimal::from(5)
}

fn default_max_order_count() -> usize {
    20
}

fn default_max_daily_loss() -> Decimal {
    Decimal::from(1_000)
}

fn default_max_price_change() -> Decimal {
    Decimal::new(5, 2) // 0.05
}

fn default_check_interval() -> u64 {
    10
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position: default_max_position(),
            max_order_count: default_max_order_count(),
            max_daily_loss: default_max_daily_loss(),
            max_price_change: default_max_price_change(),
            check_interval: default_check_interval(),
        }
    }
}
