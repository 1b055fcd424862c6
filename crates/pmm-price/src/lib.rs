//! Reference-price estimation.
//!
//! Consumes raw market trades and book updates and produces a smoothed,
//! outlier-resistant reference price used to center the quoting band.

pub mod config;
pub mod estimator;
pub mod service;

pub use config::{PriceConfig, PriceMethod};
pub use estimator::ReferencePriceEstimator;
pub use service::run_estimator;
