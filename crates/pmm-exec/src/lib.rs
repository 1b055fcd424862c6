//! Execution engine.
//!
//! Drains approved decisions through two independent worker pools: one for
//! places and cancels, one for amendments, each behind its own token
//! bucket, retries transient exchange failures with exponential backoff,
//! and reconciles every response into an `ExchangeEvent` on the bus.

pub mod adapter;
pub mod config;
pub mod engine;
pub mod limiter;

pub use adapter::{
    BoxFuture, DynExchangeAdapter, ExchangeAdapter, ExchangeError, PaperExchange, PlaceAck,
    PlaceRequest,
};
pub use config::ExecutionConfig;
pub use engine::{run_execution, ExecutionEngine};
pub use limiter::TokenBucket;
