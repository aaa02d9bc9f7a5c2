//! Configuration validation
//!
//! Validates what serde cannot express:
//! - Executor batch size and drain timeout are non-zero
//! - File sinks have a path, the forwarder has a `host:port` target
//! - Metrics interval is non-zero when metrics are enabled

use crate::Config;
use crate::error::{ConfigError, Result};
use crate::executor::ExecutorSection;
use crate::sink::SinkConfig;

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_executor(&config.executor)?;
    validate_sink(&config.sink)?;

    if config.metrics.enabled && config.metrics.interval.is_zero() {
        return Err(ConfigError::invalid_value(
            "metrics",
            "metrics",
            "interval",
            "must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_executor(executor: &ExecutorSection) -> Result<()> {
    if executor.batch_size == 0 {
        return Err(ConfigError::invalid_value(
            "executor",
            "executor",
            "batch_size",
            "must be greater than 0",
        ));
    }

    if executor.drain_timeout.is_zero() {
        return Err(ConfigError::invalid_value(
            "executor",
            "executor",
            "drain_timeout",
            "must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_sink(sink: &SinkConfig) -> Result<()> {
    let name = sink.type_name();

    match sink {
        SinkConfig::Stdout => {}
        SinkConfig::File(file) => {
            if file.path.trim().is_empty() {
                return Err(ConfigError::missing_field("sink", name, "path"));
            }
        }
        SinkConfig::HourlyFile(hourly) => {
            if hourly.path.trim().is_empty() {
                return Err(ConfigError::missing_field("sink", name, "path"));
            }
        }
        SinkConfig::Forwarder(forwarder) => {
            if forwarder.target.trim().is_empty() {
                return Err(ConfigError::missing_field("sink", name, "target"));
            }
            if !forwarder
                .target
                .rsplit_once(':')
                .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
            {
                return Err(ConfigError::invalid_value(
                    "sink",
                    name,
                    "target",
                    format!("'{}' is not host:port", forwarder.target),
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{FileSinkConfig, ForwarderSinkConfig};
    use std::time::Duration;

    fn forwarder(target: &str) -> Config {
        Config {
            sink: SinkConfig::Forwarder(ForwarderSinkConfig {
                target: target.into(),
                ..ForwarderSinkConfig::default()
            }),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_drain_timeout_rejected() {
        let mut config = Config::default();
        config.executor.drain_timeout = Duration::ZERO;

        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("drain_timeout"));
    }

    #[test]
    fn test_unbounded_queue_allowed() {
        let mut config = Config::default();
        config.executor.queue_capacity = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_file_sink_requires_path() {
        let config = Config {
            sink: SinkConfig::File(FileSinkConfig {
                path: "  ".into(),
                buffer_size: 0,
            }),
            ..Config::default()
        };

        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { field: "path", .. })
        ));
    }

    #[test]
    fn test_forwarder_target() {
        assert!(validate_config(&forwarder("localhost:7070")).is_ok());
        assert!(validate_config(&forwarder("[::1]:7070")).is_ok());

        assert!(matches!(
            validate_config(&forwarder("")),
            Err(ConfigError::MissingField { field: "target", .. })
        ));
        assert!(matches!(
            validate_config(&forwarder("localhost")),
            Err(ConfigError::InvalidValue { field: "target", .. })
        ));
        assert!(matches!(
            validate_config(&forwarder(":7070")),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_zero_metrics_interval() {
        let mut config = Config::default();
        config.metrics.interval = Duration::ZERO;
        assert!(validate_config(&config).is_err());

        config.metrics.enabled = false;
        assert!(validate_config(&config).is_ok());
    }
}
