//! Batchline Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! An empty file is a valid config: lines go to stdout in batches of 100.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use batchline_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[sink]\ntype = \"file\"\npath = \"out.log\"").unwrap();
//! ```
//!
//! # Example Config
//!
//! ```toml
//! [log]
//! level = "info"
//! format = "console"
//!
//! [executor]
//! batch_size = 500
//! queue_capacity = 10000
//! drain_timeout = "500ms"
//! retry_interval = "1s"
//!
//! [sink]
//! type = "hourly_file"
//! path = "/var/log/batchline/events.log"
//!
//! [metrics]
//! interval = "30s"
//! ```

mod error;
mod executor;
mod logging;
mod metrics;
mod sink;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use error::{ConfigError, Result};
pub use executor::ExecutorSection;
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use metrics::MetricsConfig;
pub use sink::{FileSinkConfig, ForwarderSinkConfig, HourlyFileSinkConfig, SinkConfig};

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,

    /// Batching behavior of the executor
    pub executor: ExecutorSection,

    /// Where batches are delivered
    pub sink: SinkConfig,

    /// Periodic executor metrics logging
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, contains invalid TOML or fails
    /// validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    ///
    /// Prefer using the `FromStr` trait implementation.
    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns the first invalid or missing value found.
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_str("").unwrap();

        assert_eq!(config.log.level, LogLevel::Info);
        assert_eq!(config.executor.batch_size, 100);
        assert_eq!(config.executor.queue_capacity, 10_000);
        assert!(matches!(config.sink, SinkConfig::Stdout));
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_full_config_parse() {
        let toml = r#"
[log]
level = "debug"
format = "json"
output = "stderr"

[executor]
batch_size = 500
queue_capacity = 0
drain_timeout = "250ms"
retry_interval = "2s"

[sink]
type = "forwarder"
target = "collector:7070"
ack_timeout = "10s"

[metrics]
enabled = false
interval = "5s"
"#;
        let config = Config::from_str(toml).unwrap();

        assert_eq!(config.log.level, LogLevel::Debug);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.executor.batch_size, 500);
        assert_eq!(config.executor.queue_capacity, 0);
        assert_eq!(config.executor.drain_timeout, Duration::from_millis(250));
        assert_eq!(config.executor.retry_interval, Duration::from_secs(2));
        assert!(!config.metrics.enabled);
        assert_eq!(config.metrics.interval, Duration::from_secs(5));

        let SinkConfig::Forwarder(forwarder) = config.sink else {
            panic!("expected forwarder sink");
        };
        assert_eq!(forwarder.target, "collector:7070");
        assert_eq!(forwarder.ack_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_validation_runs_on_parse() {
        let err = Config::from_str("[executor]\nbatch_size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "batch_size", .. }));

        let err = Config::from_str("[sink]\ntype = \"file\"").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "path", .. }));
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::from_str("invalid { toml");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_unknown_sink_type() {
        let result = Config::from_str("[sink]\ntype = \"kafka\"");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sink]\ntype = \"hourly_file\"\npath = \"events.log\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(matches!(config.sink, SinkConfig::HourlyFile(_)));
    }

    #[test]
    fn test_from_missing_file() {
        let err = Config::from_file("/nonexistent/batchline.toml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError { .. }));
        assert!(err.to_string().contains("/nonexistent/batchline.toml"));
    }
}
