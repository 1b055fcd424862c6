//! Execution configuration (`[execution]` section).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Workers in the place/cancel pool.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Depth of each pool's task queue.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Place/cancel budget, operations per second. Zero disables limiting.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
    /// Retry attempts for transient exchange failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base retry delay in seconds; attempt k waits `retry_delay * 2^k`.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,
    /// Workers in the amend pool.
    #[serde(default = "default_modify_worker_count")]
    pub modify_worker_count: usize,
    /// Amend budget, operations per second. Zero disables limiting.
    #[serde(default = "default_modify_rate_limit")]
    pub modify_rate_limit: u32,
}

fn default_worker_count() -> usize {
    2
}

fn default_batch_size() -> usize {
    16
}

fn default_rate_limit() -> u32 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> f64 {
    0.5
}

fn default_modify_worker_count() -> usize {
    1
}

fn default_modify_rate_limit() -> u32 {
    5
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            batch_size: default_batch_size(),
            rate_limit: default_rate_limit(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            modify_worker_count: default_modify_worker_count(),
            modify_rate_limit: default_modify_rate_limit(),
        }
    }
}
