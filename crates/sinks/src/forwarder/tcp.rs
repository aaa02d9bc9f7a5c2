//! TCP transport for the forwarder

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::frame::ACK_OK;
use super::{BatchClient, ClientFactory, ForwarderError};

/// Configuration for TCP forwarding
#[derive(Debug, Clone)]
pub struct TcpForwarderConfig {
    /// Receiver address (host:port)
    pub target: String,

    /// Connection timeout
    pub connection_timeout: Duration,

    /// Write timeout per frame
    pub write_timeout: Duration,

    /// Time allowed for the receiver to ack a frame
    pub ack_timeout: Duration,

    /// TCP keep-alive enabled
    pub tcp_keepalive: bool,

    /// TCP keep-alive interval (only used if tcp_keepalive is true)
    pub tcp_keepalive_interval: Duration,
}

impl TcpForwarderConfig {
    /// Create a config for `target` with default timeouts
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            connection_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
            ack_timeout: Duration::from_secs(30),
            tcp_keepalive: true,
            tcp_keepalive_interval: Duration::from_secs(30),
        }
    }

    /// Set connection timeout
    #[must_use]
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set write timeout
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set ack timeout
    #[must_use]
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Enable or disable TCP keep-alive
    #[must_use]
    pub fn with_tcp_keepalive(mut self, enabled: bool) -> Self {
        self.tcp_keepalive = enabled;
        self
    }

    /// Set TCP keep-alive interval
    #[must_use]
    pub fn with_tcp_keepalive_interval(mut self, interval: Duration) -> Self {
        self.tcp_keepalive_interval = interval;
        self
    }
}

/// Opens [`TcpBatchClient`] connections
#[derive(Debug, Clone)]
pub struct TcpClientFactory {
    config: TcpForwarderConfig,
}

impl TcpClientFactory {
    pub fn new(config: TcpForwarderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TcpForwarderConfig {
        &self.config
    }

    fn configure_socket(&self, stream: &TcpStream) {
        // Set TCP_NODELAY for lower latency (non-fatal if it fails)
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(
                target = %self.config.target,
                error = %e,
                "failed to set TCP_NODELAY, continuing with default buffering"
            );
        }

        if !self.config.tcp_keepalive {
            return;
        }

        let sock_ref = SockRef::from(stream);
        let keepalive = TcpKeepalive::new().with_time(self.config.tcp_keepalive_interval);

        // On Linux, also set the interval between probes
        #[cfg(target_os = "linux")]
        let keepalive = keepalive.with_interval(self.config.tcp_keepalive_interval);

        if let Err(e) = sock_ref.set_tcp_keepalive(&keepalive) {
            tracing::debug!(
                target = %self.config.target,
                error = %e,
                "failed to set TCP keep-alive, continuing without keep-alive"
            );
        }
    }
}

#[async_trait]
impl ClientFactory for TcpClientFactory {
    type Client = TcpBatchClient;

    async fn connect(&self) -> Result<TcpBatchClient, ForwarderError> {
        let stream = match timeout(
            self.config.connection_timeout,
            TcpStream::connect(&self.config.target),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ForwarderError::ConnectionFailed {
                    target: self.config.target.clone(),
                    source: e,
                });
            }
            Err(_) => {
                return Err(ForwarderError::ConnectionFailed {
                    target: self.config.target.clone(),
                    source: std::io::Error::new(ErrorKind::TimedOut, "connection timed out"),
                });
            }
        };

        self.configure_socket(&stream);

        Ok(TcpBatchClient {
            stream,
            write_timeout: self.config.write_timeout,
            ack_timeout: self.config.ack_timeout,
            active: true,
        })
    }

    fn target(&self) -> &str {
        &self.config.target
    }
}

/// One TCP connection to a receiver
///
/// Marked inactive after any failure; the forwarder then replaces it.
#[derive(Debug)]
pub struct TcpBatchClient {
    stream: TcpStream,
    write_timeout: Duration,
    ack_timeout: Duration,
    active: bool,
}

impl TcpBatchClient {
    async fn exchange(&mut self, frame: &[u8]) -> Result<(), ForwarderError> {
        timeout(self.write_timeout, async {
            self.stream.write_all(frame).await?;
            self.stream.flush().await
        })
        .await
        .map_err(|_| ForwarderError::Timeout("write"))??;

        let ack = timeout(self.ack_timeout, self.stream.read_u8())
            .await
            .map_err(|_| ForwarderError::Timeout("ack"))??;

        if ack != ACK_OK {
            return Err(ForwarderError::Rejected(ack));
        }
        Ok(())
    }
}

#[async_trait]
impl BatchClient for TcpBatchClient {
    fn is_active(&self) -> bool {
        self.active
    }

    async fn append_batch(&mut self, frame: Bytes) -> Result<(), ForwarderError> {
        if !self.active {
            return Err(ForwarderError::NoConnection);
        }

        let result = self.exchange(&frame).await;
        if result.is_err() {
            self.active = false;
        }
        result
    }

    async fn close(&mut self) {
        self.active = false;
        let _ = self.stream.shutdown().await;
    }
}
