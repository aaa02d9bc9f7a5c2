//! Sink configuration
//!
//! Exactly one sink receives the executor's batches. The `type` field selects
//! it:
//!
//! - `stdout` - one line per item on standard output (default)
//! - `file` - append to a single file
//! - `hourly_file` - append to a new file every UTC hour
//! - `forwarder` - send batches to a remote `batchline receive`

use std::time::Duration;

use serde::Deserialize;

/// Sink selection
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkConfig {
    /// Standard output
    #[default]
    Stdout,

    /// Single append-only file
    File(FileSinkConfig),

    /// Hourly rolling file
    HourlyFile(HourlyFileSinkConfig),

    /// Remote receiver over TCP
    Forwarder(ForwarderSinkConfig),
}

impl SinkConfig {
    /// Sink type name as written in config
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::File(_) => "file",
            Self::HourlyFile(_) => "hourly_file",
            Self::Forwarder(_) => "forwarder",
        }
    }
}

/// Single file sink
///
/// ```toml
/// [sink]
/// type = "file"
/// path = "events.log"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileSinkConfig {
    /// File to append to
    /// Required
    pub path: String,

    /// Write buffer size in bytes; 0 selects the sink default (64KB)
    /// Default: 0
    pub buffer_size: usize,
}

/// Hourly rolling file sink
///
/// ```toml
/// [sink]
/// type = "hourly_file"
/// path = "/var/log/app/events.log"   # → events-YYYY-MM-DDTHH.log
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HourlyFileSinkConfig {
    /// Base path the hourly file names are derived from
    /// Required
    pub path: String,
}

/// Forwarder sink
///
/// ```toml
/// [sink]
/// type = "forwarder"
/// target = "collector.internal:7070"
/// connection_timeout = "10s"
/// write_timeout = "5s"
/// ack_timeout = "30s"
/// tcp_keepalive = true
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForwarderSinkConfig {
    /// Receiver address (host:port)
    /// Required
    pub target: String,

    /// Connection timeout
    /// Default: 10s
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Duration,

    /// Write timeout per batch
    /// Default: 5s
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,

    /// Time allowed for the receiver's ack
    /// Default: 30s
    #[serde(with = "humantime_serde")]
    pub ack_timeout: Duration,

    /// Enable TCP keep-alive
    /// Default: true
    pub tcp_keepalive: bool,

    /// TCP keep-alive interval
    /// Default: 30s
    #[serde(with = "humantime_serde")]
    pub tcp_keepalive_interval: Duration,
}

impl Default for ForwarderSinkConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            connection_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
            ack_timeout: Duration::from_secs(30),
            tcp_keepalive: true,
            tcp_keepalive_interval: Duration::from_secs(30),
        }
    }
}
