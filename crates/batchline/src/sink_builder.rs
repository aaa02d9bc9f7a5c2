//! Sink and executor construction from config

use std::io::{self, BufWriter, Stdout};

use anyhow::{Context, Result};
use batchline_config::{ExecutorSection, ForwarderSinkConfig, SinkConfig};
use batchline_executor::{BatchHandler, ExecutorConfig};
use batchline_sinks::file::{DEFAULT_BUFFER_SIZE, HourlyFileWriter, LineFileWriter, LineWriter};
use batchline_sinks::forwarder::{BatchForwarder, TcpClientFactory, TcpForwarderConfig};

/// Sink handed to the executor, erased so every config maps to one type
pub type DynSink = Box<dyn BatchHandler<String>>;

/// Line writer on standard output
pub type StdoutWriter = LineWriter<BufWriter<Stdout>>;

/// Build the configured sink
///
/// File sinks open their file here, so a bad path fails at startup rather
/// than on the first batch. The hourly and forwarder sinks open lazily.
pub fn build_sink(config: &SinkConfig) -> Result<DynSink> {
    let sink: DynSink = match config {
        SinkConfig::Stdout => Box::new(StdoutWriter::new(BufWriter::new(io::stdout()), "stdout")),
        SinkConfig::File(file) => {
            let buffer_size = match file.buffer_size {
                0 => DEFAULT_BUFFER_SIZE,
                size => size,
            };
            let writer = LineFileWriter::open_with_capacity(&file.path, buffer_size)
                .with_context(|| format!("failed to open sink file {}", file.path))?;
            Box::new(writer)
        }
        SinkConfig::HourlyFile(hourly) => Box::new(HourlyFileWriter::new(hourly.path.clone())),
        SinkConfig::Forwarder(forwarder) => Box::new(BatchForwarder::with_name(
            TcpClientFactory::new(forwarder_config(forwarder)),
            forwarder.target.clone(),
        )),
    };

    tracing::debug!(sink = config.type_name(), "sink created");
    Ok(sink)
}

/// Map the forwarder section onto the transport config
pub fn forwarder_config(config: &ForwarderSinkConfig) -> TcpForwarderConfig {
    TcpForwarderConfig::new(config.target.clone())
        .with_connection_timeout(config.connection_timeout)
        .with_write_timeout(config.write_timeout)
        .with_ack_timeout(config.ack_timeout)
        .with_tcp_keepalive(config.tcp_keepalive)
        .with_tcp_keepalive_interval(config.tcp_keepalive_interval)
}

/// Map the executor section onto the executor config
pub fn executor_config(section: &ExecutorSection) -> ExecutorConfig {
    ExecutorConfig::default()
        .with_batch_size(section.batch_size)
        .with_queue_capacity(section.queue_capacity)
        .with_drain_timeout(section.drain_timeout)
        .with_retry_interval(section.retry_interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchline_config::{FileSinkConfig, HourlyFileSinkConfig};
    use std::time::Duration;

    #[test]
    fn test_executor_config_mapping() {
        let section = ExecutorSection {
            batch_size: 42,
            queue_capacity: 0,
            drain_timeout: Duration::from_millis(20),
            retry_interval: Duration::from_millis(300),
        };

        let config = executor_config(&section);
        assert_eq!(config.batch_size, 42);
        assert!(!config.is_bounded());
        assert_eq!(config.drain_timeout, Duration::from_millis(20));
        assert_eq!(config.retry_interval, Duration::from_millis(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_sections_agree() {
        assert_eq!(
            executor_config(&ExecutorSection::default()),
            ExecutorConfig::default()
        );
    }

    #[test]
    fn test_forwarder_config_mapping() {
        let section = ForwarderSinkConfig {
            target: "collector:7070".into(),
            ack_timeout: Duration::from_secs(3),
            tcp_keepalive: false,
            ..ForwarderSinkConfig::default()
        };

        let config = forwarder_config(&section);
        assert_eq!(config.target, "collector:7070");
        assert_eq!(config.ack_timeout, Duration::from_secs(3));
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
        assert!(!config.tcp_keepalive);
    }

    #[test]
    fn test_build_file_sink_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");

        let config = SinkConfig::File(FileSinkConfig {
            path: path.display().to_string(),
            buffer_size: 0,
        });
        build_sink(&config).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_build_file_sink_bad_path() {
        let config = SinkConfig::File(FileSinkConfig {
            path: "/nonexistent/dir/out.log".into(),
            buffer_size: 0,
        });

        let err = build_sink(&config).err().unwrap();
        assert!(err.to_string().contains("/nonexistent/dir/out.log"));
    }

    #[test]
    fn test_build_lazy_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("events.log");

        let hourly = SinkConfig::HourlyFile(HourlyFileSinkConfig {
            path: base.display().to_string(),
        });
        assert!(build_sink(&hourly).is_ok());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let forwarder = SinkConfig::Forwarder(ForwarderSinkConfig {
            target: "127.0.0.1:1".into(),
            ..ForwarderSinkConfig::default()
        });
        assert!(build_sink(&forwarder).is_ok());
    }
}
