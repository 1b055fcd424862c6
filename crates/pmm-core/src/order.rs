//! Order types and lifecycle state.
//!
//! An [`Order`] is owned and mutated exclusively by the order manager;
//! every other component works with cloned snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{Price, Qty};

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Returns 1 for buy, -1 for sell (for position calculations).
    pub fn sign(&self) -> i8 {
        match self {
            Self::Buy => 1,
            Self::Sell => -1,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Client order ID for idempotency.
///
/// Every order must carry a unique id so retried submissions are not
/// duplicated on the exchange. Stable across amendments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientOrderId(String);

impl ClientOrderId {
    /// Create a new unique client order ID.
    ///
    /// Format: `pmm_{timestamp_ms}_{uuid_short}`
    pub fn new() -> Self {
        let ts = Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().to_string()[..8];
        Self(format!("pmm_{ts}_{uuid_short}"))
    }

    /// Create from an existing string (for parsing responses).
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientOrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClientOrderId {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

impl AsRef<str> for ClientOrderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Submitted to the exchange, no ack yet.
    PendingNew,
    /// Resting on the book.
    Active,
    /// Amend submitted, waiting for the exchange to confirm or reject.
    PendingAmend,
    /// Cancel submitted, waiting for the exchange to confirm or reject.
    PendingCancel,
    /// Completely filled.
    Filled,
    /// Cancelled.
    Cancelled,
    /// Rejected by the exchange.
    Rejected,
}

impl OrderStatus {
    /// Returns true if the order has reached a lifecycle end state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }

    /// Returns true if a modification (amend or cancel) is outstanding.
    #[must_use]
    pub fn has_pending_modification(&self) -> bool {
        matches!(self, Self::PendingAmend | Self::PendingCancel)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PendingNew => "pending_new",
            Self::Active => "active",
            Self::PendingAmend => "pending_amend",
            Self::PendingCancel => "pending_cancel",
            Self::Filled => "filled",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

/// Target price/quantity of an in-flight amendment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmendTarget {
    pub price: Price,
    pub quantity: Qty,
}

/// A tracked order, from submission through its terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Exchange-assigned order ID. Absent until the first ack.
    pub order_id: Option<String>,
    /// Locally-unique client order ID, stable across amendments.
    pub client_order_id: ClientOrderId,
    /// Trading pair.
    pub symbol: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Current limit price.
    pub price: Price,
    /// Original order quantity (replaced on a successful amend).
    pub original_quantity: Qty,
    /// Filled quantity, monotonically non-decreasing.
    pub executed_quantity: Qty,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// Target of the outstanding amend, present iff status is `PendingAmend`.
    pub pending_amend: Option<AmendTarget>,
    /// Number of successful amendments applied.
    pub amend_count: u32,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    pub last_event_time: DateTime<Utc>,
    pub last_amend_time: Option<DateTime<Utc>>,
}

impl Order {
    /// Create a freshly submitted order in `PendingNew`.
    pub fn new(
        client_order_id: ClientOrderId,
        symbol: String,
        side: OrderSide,
        price: Price,
        quantity: Qty,
    ) -> Self {
        let now = Utc::now();
        Self {
            order_id: None,
            client_order_id,
            symbol,
            side,
            price,
            original_quantity: quantity,
            executed_quantity: Qty::ZERO,
            status: OrderStatus::PendingNew,
            pending_amend: None,
            amend_count: 0,
            create_time: now,
            update_time: now,
            last_event_time: now,
            last_amend_time: None,
        }
    }

    /// Remaining unfilled quantity.
    #[must_use]
    pub fn remaining_quantity(&self) -> Qty {
        self.original_quantity - self.executed_quantity
    }

    /// Notional value of the original quantity at the current price.
    #[must_use]
    pub fn order_value(&self) -> rust_decimal::Decimal {
        self.original_quantity.notional(self.price)
    }

    /// Whether the order still occupies (or will occupy) a book slot:
    /// anything non-terminal that has not been asked to cancel.
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::PendingNew | OrderStatus::Active | OrderStatus::PendingAmend
        )
    }

    /// Whether the order counts as completely filled.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.executed_quantity >= self.original_quantity
    }
}
