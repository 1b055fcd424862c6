//! Passive quoting strategy.
//!
//! Keeps `target_orders_per_side` resting orders per side inside the spread
//! band around the reference price, amending in place for small drift and
//! falling back to cancel+replace beyond the amendment tolerance.

pub mod config;
pub mod engine;
pub mod service;

pub use config::StrategyConfig;
pub use engine::StrategyEngine;
pub use service::run_strategy;
