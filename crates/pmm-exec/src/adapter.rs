//! Exchange adapter contract.
//!
//! The live REST/WebSocket adapter lives outside the engine; the execution
//! engine only sees this trait. `PaperExchange` is the in-process
//! implementation used by paper mode and the test suite.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;

use pmm_core::{ClientOrderId, OrderSide, Price, Qty};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Exchange failure classes. Only transient classes are retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExchangeError {
    /// Network error, timeout, HTTP 5xx, exchange "try again".
    #[error("transient exchange failure: {0}")]
    Transient(String),
    /// Exchange-side rate limit refusal.
    #[error("exchange rate limit refusal")]
    RateLimited,
    /// Invalid order, unknown symbol, insufficient balance.
    #[error("permanent exchange failure: {0}")]
    Permanent(String),
}

impl ExchangeError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited)
    }
}

/// New-order request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub price: Price,
    pub quantity: Qty,
    pub client_order_id: ClientOrderId,
}

/// Successful new-order acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceAck {
    pub order_id: String,
}

/// Callable exchange capability injected into the execution engine.
pub trait ExchangeAdapter: Send + Sync {
    fn place(&self, request: PlaceRequest) -> BoxFuture<'_, Result<PlaceAck, ExchangeError>>;

    fn amend<'a>(
        &'a self,
        order_id: &'a str,
        new_price: Price,
        new_quantity: Qty,
    ) -> BoxFuture<'a, Result<(), ExchangeError>>;

    fn cancel<'a>(&'a self, order_id: &'a str) -> BoxFuture<'a, Result<(), ExchangeError>>;
}

/// Arc wrapper for adapter trait objects.
pub type DynExchangeAdapter = Arc<dyn ExchangeAdapter>;

/// Deterministic in-process exchange.
///
/// Acknowledges every operation unless failures have been scripted;
/// records every call for verification.
#[derive(Debug, Default)]
pub struct PaperExchange {
    next_order_id: AtomicU64,
    place_failures: parking_lot::Mutex<VecDeque<ExchangeError>>,
    amend_failures: parking_lot::Mutex<VecDeque<ExchangeError>>,
    cancel_failures: parking_lot::Mutex<VecDeque<ExchangeError>>,
    places: parking_lot::Mutex<Vec<PlaceRequest>>,
    amends: parking_lot::Mutex<Vec<(String, Price, Qty)>>,
    cancels: parking_lot::Mutex<Vec<String>>,
}

impl PaperExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script failures to return (in order) before places succeed again.
    pub fn fail_places_with(&self, errors: impl IntoIterator<Item = ExchangeError>) {
        self.place_failures.lock().extend(errors);
    }

    pub fn fail_amends_with(&self, errors: impl IntoIterator<Item = ExchangeError>) {
        self.amend_failures.lock().extend(errors);
    }

    pub fn fail_cancels_with(&self, errors: impl IntoIterator<Item = ExchangeError>) {
        self.cancel_failures.lock().extend(errors);
    }

    pub fn placed(&self) -> Vec<PlaceRequest> {
        self.places.lock().clone()
    }

    pub fn amended(&self) -> Vec<(String, Price, Qty)> {
        self.amends.lock().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancels.lock().clone()
    }
}

impl ExchangeAdapter for PaperExchange {
    fn place(&self, request: PlaceRequest) -> BoxFuture<'_, Result<PlaceAck, ExchangeError>> {
        Box::pin(async move {
            if let Some(err) = self.place_failures.lock().pop_front() {
                return Err(err);
            }
            self.places.lock().push(request);
            let n = self.next_order_id.fetch_add(1, Ordering::AcqRel);
            Ok(PlaceAck {
                order_id: format!("P-{n}"),
            })
        })
    }

    fn amend<'a>(
        &'a self,
        order_id: &'a str,
        new_price: Price,
        new_quantity: Qty,
    ) -> BoxFuture<'a, Result<(), ExchangeError>> {
        Box::pin(async move {
            if let Some(err) = self.amend_failures.lock().pop_front() {
                return Err(err);
            }
            self.amends
                .lock()
                .push((order_id.to_string(), new_price, new_quantity));
            Ok(())
        })
    }

    fn cancel<'a>(&'a self, order_id: &'a str) -> BoxFuture<'a, Result<(), ExchangeError>> {
        Box::pin(async move {
            if let Some(err) = self.cancel_failures.lock().pop_front() {
                return Err(err);
            }
            self.cancels.lock().push(order_id.to_string());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> PlaceRequest {
        PlaceRequest {
            symbol: "BTCUSDT".to_string(),
            side: OrderSide::Buy,
            price: Price::new(dec!(29910)),
            quantity: Qty::new(dec!(0.5)),
            client_order_id: ClientOrderId::new(),
        }
    }

    #[tokio::test]
    async fn test_paper_place_assigns_ids() {
        let exchange = PaperExchange::new();
        let a = exchange.place(request()).await.unwrap();
        let b = exchange.place(request()).await.unwrap();
        assert_ne!(a.order_id, b.order_id);
        assert_eq!(exchange.placed().len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_failures_drain_in_order() {
        let exchange = PaperExchange::new();
        exchange.fail_places_with([
            ExchangeError::Transient("boom".to_string()),
            ExchangeError::RateLimited,
        ]);

        assert_eq!(
            exchange.place(request()).await,
            Err(ExchangeError::Transient("boom".to_string()))
        );
        assert_eq!(exchange.place(request()).await, Err(ExchangeError::RateLimited));
        assert!(exchange.place(request()).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_records_order_id() {
        let exchange = PaperExchange::new();
        exchange.cancel("P-7").await.unwrap();
        assert_eq!(exchange.cancelled(), vec!["P-7".to_string()]);
    }

    #[test]
    fn test_error_classes() {
        assert!(ExchangeError::Transient("x".to_string()).is_retryable());
        assert!(ExchangeError::RateLimited.is_retryable());
        assert!(!ExchangeError::Permanent("x".to_string()).is_retryable());
    }
}
