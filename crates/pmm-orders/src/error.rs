//! Error types for pmm-orders.

use pmm_core::{ClientOrderId, OrderStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Unknown order: {0}")]
    UnknownOrder(ClientOrderId),

    #[error("Duplicate client order id: {0}")]
    DuplicateOrder(ClientOrderId),

    #[error("Order {id} in status {status} cannot accept this operation")]
    InvalidState { id: ClientOrderId, status: OrderStatus },

    #[error("Order {0} already has an outstanding modification")]
    ModificationPending(ClientOrderId),

    #[error("Global amend limit reached ({0} in flight)")]
    AmendCapExceeded(usize),
}

pub type OrderResult<T> = Result<T, OrderError>;
