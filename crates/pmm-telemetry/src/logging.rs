//! Structured logging initialization.

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, TelemetryConfig};
use crate::error::{TelemetryError, TelemetryResult};

/// Install the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` when set, otherwise from the
/// configured `log_level`; the output format follows `log_format`.
/// Fails if the filter directive is invalid or a subscriber is already
/// installed.
pub fn init_logging(config: &TelemetryConfig) -> TelemetryResult<()> {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV)
        .unwrap_or_else(|_| config.log_level.clone());
    let filter = EnvFilter::try_new(&directives)
        .map_err(|e| TelemetryError::LoggingInit(format!("bad filter {directives:?}: {e}")))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Json => builder
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Pretty => builder.pretty().with_target(true).try_init(),
    }
    .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_directive_rejected() {
        let config = TelemetryConfig {
            log_level: "not==a==filter".to_string(),
            ..TelemetryConfig::default()
        };
        // The directive is validated before any subscriber is installed.
        assert!(matches!(
            init_logging(&config),
            Err(TelemetryError::LoggingInit(_))
        ));
    }
}
