//! Metrics reporting configuration
//!
//! When enabled, the binary logs an executor metrics snapshot (queue fill,
//! delivered items, failed attempts) every `interval`.

use serde::Deserialize;
use std::time::Duration;

/// Metrics configuration
///
/// # Example
///
/// ```toml
/// [metrics]
/// enabled = true
/// interval = "10s"
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable periodic metrics logging
    /// Default: true
    pub enabled: bool,

    /// Reporting interval
    /// Default: 10s
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(10),
        }
    }
}
