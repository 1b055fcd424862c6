//! Estimator configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Reference price calculation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceMethod {
    /// Arithmetic mean of window sample prices.
    Twap,
    /// Volume-weighted average over the window's traded volume.
    Vwap,
    /// Exponential moving average with `smoothing_factor` as alpha.
    Ema,
    /// 0.6 * TWAP + 0.4 * VWAP.
    #[default]
    Hybrid,
}

/// Estimator configuration (`[price]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConfig {
    /// Calculation method.
    #[serde(default)]
    pub method: PriceMethod,
    /// Number of most recent samples kept in the window.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// EMA alpha.
    #[serde(default = "default_smoothing_factor")]
    pub smoothing_factor: Decimal,
    /// Minimum fractional move since the last emission before a new
    /// `PriceUpdate` is published (EMA emits on every accepted sample).
    #[serde(default = "default_change_threshold")]
    pub change_threshold: Decimal,
    /// Samples deviating more than this fraction from the current estimate
    /// are dropped.
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: Decimal,
}

fn default_window_size() -> usize {
    10
}

fn default_smoothing_factor() -> Decimal {
    Decimal::new(1, 1) // 0.1
}

fn default_change_threshold() -> Decimal {
    Decimal::new(1, 3) // 0.001
}

fn default_anomaly_threshold() -> Decimal {
    Decimal::new(5, 2) // 0.05
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            method: PriceMethod::default(),
            window_size: default_window_size(),
            smoothing_factor: default_smoothing_factor(),
            change_threshold: default_change_threshold(),
            anomaly_threshold: default_anomaly_threshold(),
        }
    }
}
