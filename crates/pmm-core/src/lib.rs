//! Core domain types for the passive market-making engine.
//!
//! This crate provides the fundamental types used throughout the system:
//! - `Price`, `Qty`: precision-safe numeric types
//! - `Order`, `OrderStatus`: order lifecycle data
//! - `Decision`: strategy output (place / amend / cancel)
//! - Event payloads carried on the engine bus

pub mod decimal;
pub mod decision;
pub mod error;
pub mod events;
pub mod order;

pub use decimal::{Price, Qty};
pub use decision::Decision;
pub use error::{CoreError, Result};
pub use events::{
    BookUpdate, BusOverflow, EmergencyStop, ExchangeEvent, MarketTrade, OrderStateChanged,
    PriceUpdate, ResetTick, RiskAlert, RiskAlertKind,
};
pub use order::{AmendTarget, ClientOrderId, Order, OrderSide, OrderStatus};
