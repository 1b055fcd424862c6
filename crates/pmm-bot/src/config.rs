//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use pmm_exec::ExecutionConfig;
use pmm_orders::OrderManagementConfig;
use pmm_price::PriceConfig;
use pmm_risk::RiskConfig;
use pmm_strategy::StrategyConfig;
use pmm_telemetry::TelemetryConfig;

use crate::error::{AppError, AppResult};

/// Exchange adapter credentials (`[api]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub secret: String,
    /// Paper trading against the in-process exchange.
    #[serde(default = "default_testnet")]
    pub testnet: bool,
}

fn default_testnet() -> bool {
    true
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            secret: String::new(),
            testnet: default_testnet(),
        }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub order_management: OrderManagementConfig,
    #[serde(default)]
    pub price: PriceConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Startup validation; failures are unrecoverable.
    pub fn validate(&self) -> AppResult<()> {
        self.strategy.validate().map_err(AppError::Config)?;
        if self.execution.worker_count == 0 || self.execution.modify_worker_count == 0 {
            return Err(AppError::Config(
                "execution worker counts must be at least 1".to_string(),
            ));
        }
        if self.order_management.max_pending_modifications == 0 {
            return Err(AppError::Config(
                "max_pending_modifications must be at least 1".to_string(),
            ));
        }
        if self.price.window_size < 2 {
            return Err(AppError::Config(
                "price window_size must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}
