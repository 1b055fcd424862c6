//! Strategy decisions.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ClientOrderId, OrderSide, Price, Qty};

/// A single action the strategy wants the execution engine to perform.
///
/// Dispatch is by variant; the risk gate may drop a decision before it
/// reaches the execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// Place a new resting limit order.
    Place {
        side: OrderSide,
        price: Price,
        quantity: Qty,
    },
    /// Amend an existing order in place, preserving its exchange order id.
    Amend {
        client_order_id: ClientOrderId,
        new_price: Price,
        new_quantity: Qty,
    },
    /// Cancel an existing order.
    Cancel { client_order_id: ClientOrderId },
}

impl Decision {
    /// Short label for logging and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Place { .. } => "place",
            Self::Amend { .. } => "amend",
            Self::Cancel { .. } => "cancel",
        }
    }

    /// Cancels are always risk-exempt; they only reduce exposure.
    #[must_use]
    pub fn is_cancel(&self) -> bool {
        matches!(self, Self::Cancel { .. })
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Place {
                side,
                price,
                quantity,
            } => write!(f, "place {side} {quantity}@{price}"),
            Self::Amend {
                client_order_id,
                new_price,
                new_quantity,
            } => write!(f, "amend {client_order_id} -> {new_quantity}@{new_price}"),
            Self::Cancel { client_order_id } => write!(f, "cancel {client_order_id}"),
        }
    }
}
