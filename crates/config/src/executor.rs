//! Executor configuration section

use std::time::Duration;

use serde::Deserialize;

/// Batching settings for the executor
///
/// # Example
///
/// ```toml
/// [executor]
/// batch_size = 100
/// queue_capacity = 10000   # 0 = unbounded
/// drain_timeout = "500ms"
/// retry_interval = "1s"
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutorSection {
    /// Maximum items per batch
    /// Default: 100
    pub batch_size: usize,

    /// Queue capacity; 0 selects an unbounded queue
    /// Default: 10000
    pub queue_capacity: usize,

    /// Time budget for filling one batch
    /// Default: 500ms
    #[serde(with = "humantime_serde")]
    pub drain_timeout: Duration,

    /// Pause before resubmitting a failed batch
    /// Default: 1s
    #[serde(with = "humantime_serde")]
    pub retry_interval: Duration,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            batch_size: 100,
            queue_capacity: 10_000,
            drain_timeout: Duration::from_millis(500),
            retry_interval: Duration::from_secs(1),
        }
    }
}
