//! Order management configuration (`[order_management]` section).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderManagementConfig {
    /// Full-pool reset cadence, seconds.
    #[serde(default = "default_reset_interval")]
    pub reset_interval: u64,
    /// Global cap on amendments awaiting exchange confirmation.
    #[serde(default = "default_max_pending_modifications")]
    pub max_pending_modifications: usize,
    /// Seconds after which an unresolved amend or cancel is escalated to a
    /// forced cancel.
    #[serde(default = "default_modification_timeout")]
    pub modification_timeout: u64,
    /// Terminal-order sweep cadence, seconds.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

fn default_reset_interval() -> u64 {
    300
}

fn default_max_pending_modifications() -> usize {
    10
}

fn default_modification_timeout() -> u64 {
    30
}

fn default_cleanup_interval() -> u64 {
    60
}

impl Default for OrderManagementConfig {
    fn default() -> Self {
        Self {
            reset_interval: default_reset_interval(),
            max_pending_modifications: default_max_pending_modifications(),
            modification_timeout: default_modification_timeout(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}
