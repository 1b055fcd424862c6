//! Telemetry: structured logging and Prometheus metrics.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::{LogFormat, TelemetryConfig};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
