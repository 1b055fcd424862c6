//! Reference price estimator.
//!
//! Keeps a bounded ring of recent accepted samples (trades, plus book mids
//! at zero volume) and computes a filtered reference price. Out-of-order
//! and outlier samples never enter the window.

use std::collections::VecDeque;

use rust_decimal::Decimal;
use tracing::{debug, trace};

use pmm_core::{BookUpdate, MarketTrade, Price, PriceUpdate};
use pmm_telemetry::metrics;

use crate::config::{PriceConfig, PriceMethod};

const TWAP_WEIGHT: Decimal = Decimal::from_parts(6, 0, 0, false, 1); // 0.6
const VWAP_WEIGHT: Decimal = Decimal::from_parts(4, 0, 0, false, 1); // 0.4

#[derive(Debug, Clone, Copy)]
struct PriceSample {
    price: Decimal,
    /// Traded volume; zero for book-mid samples.
    volume: Decimal,
    timestamp_ms: u64,
}

/// Streaming reference-price estimator.
#[derive(Debug)]
pub struct ReferencePriceEstimator {
    config: PriceConfig,
    window: VecDeque<PriceSample>,
    ema: Option<Decimal>,
    last_emitted: Option<Decimal>,
}

impl ReferencePriceEstimator {
    pub fn new(config: PriceConfig) -> Self {
        let capacity = config.window_size.max(2);
        Self {
            config,
            window: VecDeque::with_capacity(capacity),
            ema: None,
            last_emitted: None,
        }
    }

    /// Feed a market trade. Returns a `PriceUpdate` when one should be
    /// published.
    pub fn on_trade(&mut self, trade: &MarketTrade) -> Option<PriceUpdate> {
        self.ingest(
            trade.price.inner(),
            trade.quantity.inner(),
            trade.timestamp_ms,
        )
    }

    /// Feed a top-of-book update. The mid enters the window at zero volume
    /// so it influences TWAP/EMA but not VWAP.
    pub fn on_book_update(&mut self, update: &BookUpdate) -> Option<PriceUpdate> {
        let mid = update.mid()?;
        self.ingest(mid.inner(), Decimal::ZERO, update.timestamp_ms)
    }

    /// Most recent emitted value, if any.
    pub fn last_emitted(&self) -> Option<Price> {
        self.last_emitted.map(Price::new)
    }

    fn ingest(&mut self, price: Decimal, volume: Decimal, timestamp_ms: u64) -> Option<PriceUpdate> {
        if !price.is_sign_positive() || price.is_zero() {
            return None;
        }

        // Window timestamps are monotone; late samples are dropped.
        if let Some(newest) = self.window.back() {
            if timestamp_ms < newest.timestamp_ms {
                metrics::PRICE_SAMPLES_DROPPED
                    .with_label_values(&["out_of_order"])
                    .inc();
                trace!(timestamp_ms, "dropping out-of-order sample");
                return None;
            }
        }

        // Outlier rejection against the current estimate.
        if let Some(estimate) = self.estimate() {
            if !estimate.is_zero() {
                let deviation = ((price - estimate) / estimate).abs();
                if deviation > self.config.anomaly_threshold {
                    metrics::PRICE_SAMPLES_DROPPED
                        .with_label_values(&["outlier"])
                        .inc();
                    debug!(%price, %estimate, %deviation, "dropping outlier sample");
                    return None;
                }
            }
        }

        if self.window.len() >= self.config.window_size.max(2) {
            self.window.pop_front();
        }
        self.window.push_back(PriceSample {
            price,
            volume,
            timestamp_ms,
        });

        self.ema = Some(match self.ema {
            Some(prev) => {
                self.config.smoothing_factor * price
                    + (Decimal::ONE - self.config.smoothing_factor) * prev
            }
            None => price,
        });

        // No emission until the window can support an estimate.
        if self.window.len() < 2 {
            return None;
        }

        let value = self.estimate()?;
        if self.should_emit(value) {
            use rust_decimal::prelude::ToPrimitive;
            self.last_emitted = Some(value);
            metrics::REFERENCE_PRICE.set(value.to_f64().unwrap_or(0.0));
            Some(PriceUpdate {
                value: Price::new(value),
                timestamp_ms,
            })
        } else {
            None
        }
    }

    fn should_emit(&self, value: Decimal) -> bool {
        // EMA reacts to every accepted sample; the other methods are gated
        // on the change threshold to suppress chatter.
        if self.config.method == PriceMethod::Ema {
            return true;
        }
        match self.last_emitted {
            None => true,
            Some(last) if last.is_zero() => true,
            Some(last) => ((value - last) / last).abs() >= self.config.change_threshold,
        }
    }

    fn estimate(&self) -> Option<Decimal> {
        if self.window.is_empty() {
            return None;
        }
        match self.config.method {
            PriceMethod::Twap => self.twap(),
            PriceMethod::Vwap => self.vwap().or_else(|| self.twap()),
            PriceMethod::Ema => self.ema,
            PriceMethod::Hybrid => {
                let twap = self.twap()?;
                // Without traded volume the hybrid degrades to pure TWAP.
                match self.vwap() {
                    Some(vwap) => Some(TWAP_WEIGHT * twap + VWAP_WEIGHT * vwap),
                    None => Some(twap),
                }
            }
        }
    }

    fn twap(&self) -> Option<Decimal> {
        if self.window.is_empty() {
            return None;
        }
        let sum: Decimal = self.window.iter().map(|s| s.price).sum();
        Some(sum / Decimal::from(self.window.len()))
    }

    fn vwap(&self) -> Option<Decimal> {
        let total_volume: Decimal = self.window.iter().map(|s| s.volume).sum();
        if total_volume.is_zero() {
            return None;
        }
        let total_value: Decimal = self.window.iter().map(|s| s.price * s.volume).sum();
        Some(total_value / total_volume)
    }
}
