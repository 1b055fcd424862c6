//! Event payloads carried on the engine bus.
//!
//! Market data flows in (`MarketTrade`, `BookUpdate`), the estimator emits
//! `PriceUpdate`, the strategy emits `Decision`s, the execution engine
//! reconciles exchange responses into `ExchangeEvent`s, and the order
//! manager broadcasts `OrderStateChanged` snapshots.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order::{ClientOrderId, Order, OrderStatus};
use crate::{Price, Qty};

/// A trade observed on the market data stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketTrade {
    pub price: Price,
    pub quantity: Qty,
    /// Exchange event time, Unix milliseconds.
    pub timestamp_ms: u64,
}

/// Top-of-book update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookUpdate {
    pub best_bid: Price,
    pub best_ask: Price,
    /// Exchange event time, Unix milliseconds.
    pub timestamp_ms: u64,
}

impl BookUpdate {
    /// Mid price, None when either side is missing or the book is crossed.
    pub fn mid(&self) -> Option<Price> {
        if !self.best_bid.is_positive() || !self.best_ask.is_positive() {
            return None;
        }
        if self.best_bid >= self.best_ask {
            return None;
        }
        Some(Price::new(
            (self.best_bid.inner() + self.best_ask.inner()) / Decimal::TWO,
        ))
    }
}

/// Filtered reference price emitted by the estimator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub value: Price,
    pub timestamp_ms: u64,
}

/// An exchange response, reconciled by the execution engine.
///
/// All response kinds share one channel so that, per client order id, the
/// order manager applies them in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeEvent {
    OrderAck {
        client_order_id: ClientOrderId,
        order_id: String,
    },
    OrderReject {
        client_order_id: ClientOrderId,
        reason: String,
    },
    AmendAck {
        client_order_id: ClientOrderId,
    },
    AmendReject {
        client_order_id: ClientOrderId,
        reason: String,
    },
    CancelAck {
        client_order_id: ClientOrderId,
    },
    CancelReject {
        client_order_id: ClientOrderId,
        reason: String,
    },
    /// A (partial or complete) fill reported by the exchange stream.
    Fill {
        client_order_id: ClientOrderId,
        quantity: Qty,
        price: Price,
        timestamp_ms: u64,
    },
}

impl ExchangeEvent {
    /// The order this response belongs to.
    pub fn client_order_id(&self) -> &ClientOrderId {
        match self {
            Self::OrderAck {
                client_order_id, ..
            }
            | Self::OrderReject {
                client_order_id, ..
            }
            | Self::AmendAck { client_order_id }
            | Self::AmendReject {
                client_order_id, ..
            }
            | Self::CancelAck { client_order_id }
            | Self::CancelReject {
                client_order_id, ..
            }
            | Self::Fill {
                client_order_id, ..
            } => client_order_id,
        }
    }
}

/// Order-state broadcast from the order manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStateChanged {
    /// Snapshot after the transition.
    pub order: Order,
    pub old_status: OrderStatus,
    /// Newly executed quantity carried by this transition, zero otherwise.
    pub fill_delta: Qty,
    /// Fill price when `fill_delta` is non-zero.
    pub fill_price: Option<Price>,
}

/// Periodic full-pool reset cadence event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetTick {
    pub at_ms: u64,
}

/// Risk gate warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub kind: RiskAlertKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskAlertKind {
    PositionLimit,
    OrderCountLimit,
    PriceMove,
    DailyLoss,
}

impl RiskAlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PositionLimit => "position_limit",
            Self::OrderCountLimit => "order_count_limit",
            Self::PriceMove => "price_move",
            Self::DailyLoss => "daily_loss",
        }
    }
}

/// Emergency teardown: cancel everything, then halt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyStop {
    pub reason: String,
}

/// Published when a bounded bus channel sheds events for a slow subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusOverflow {
    pub channel: String,
    pub dropped: u64,
}
