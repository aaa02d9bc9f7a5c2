//! Forwarder Sink - batch forwarding to a remote receiver
//!
//! Sends each batch as one frame over a client connection and treats the
//! receiver's ack as delivery.
//!
//! # Design
//!
//! - The connection is created lazily on the first batch through a
//!   [`ClientFactory`]
//! - A client that reports itself inactive is discarded before use
//! - Any transport error closes and discards the client and returns `false`,
//!   so the executor retries the same batch on a fresh connection
//!
//! # Protocol
//!
//! See [`frame`] for the wire format. The bundled transport is
//! [`TcpClientFactory`].
//!
//! # Example
//!
//! ```ignore
//! let factory = TcpClientFactory::new(TcpForwarderConfig::new("collector:7070"));
//! let sink = BatchForwarder::new(factory);
//! let executor = AsyncBatchExecutor::create_and_start(ExecutorConfig::default(), sink)?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use batchline_executor::{BatchHandler, HandlerError, RateLimitedLogger};
use bytes::Bytes;

pub mod frame;
mod tcp;

pub use tcp::{TcpBatchClient, TcpClientFactory, TcpForwarderConfig};


/// Errors from forwarder transports and framing
#[derive(Debug, thiserror::Error)]
pub enum ForwarderError {
    /// Connection failed
    #[error("connection failed to {target}: {source}")]
    ConnectionFailed {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// Read or write on an established connection failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation did not complete in time
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// The receiver answered with a non-OK ack
    #[error("batch rejected by receiver (ack {0})")]
    Rejected(u8),

    /// Batch or item exceeds the frame limits
    #[error("frame too large: {0}")]
    FrameTooLarge(String),

    /// Malformed frame
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No client connected
    #[error("no connection to target")]
    NoConnection,
}

/// A connection able to deliver encoded batch frames
#[async_trait]
pub trait BatchClient: Send + 'static {
    /// Whether the connection is still usable
    fn is_active(&self) -> bool;

    /// Send one frame and wait for the receiver to accept it
    async fn append_batch(&mut self, frame: Bytes) -> Result<(), ForwarderError>;

    /// Close the connection; errors are not reported
    async fn close(&mut self);
}

/// Creates [`BatchClient`]s on demand
#[async_trait]
pub trait ClientFactory: Send + Sync + 'static {
    type Client: BatchClient;

    /// Open a new client connection
    async fn connect(&self) -> Result<Self::Client, ForwarderError>;

    /// Destination description for logs
    fn target(&self) -> &str;
}

/// Metrics for the forwarder sink
#[derive(Debug, Default)]
pub struct ForwarderMetrics {
    /// Batches the receiver acknowledged
    pub batches_sent: AtomicU64,

    /// Items in acknowledged batches
    pub items_sent: AtomicU64,

    /// Frame bytes in acknowledged batches
    pub bytes_sent: AtomicU64,

    /// Failed connect or send attempts
    pub send_failures: AtomicU64,

    /// Connections opened
    pub connects: AtomicU64,
}

impl ForwarderMetrics {
    /// Create new metrics instance
    pub const fn new() -> Self {
        Self {
            batches_sent: AtomicU64::new(0),
            items_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            connects: AtomicU64::new(0),
        }
    }

    #[inline]
    fn record_sent(&self, items: u64, bytes: u64) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.items_sent.fetch_add(items, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    fn record_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of metrics
    pub fn snapshot(&self) -> ForwarderMetricsSnapshot {
        ForwarderMetricsSnapshot {
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            items_sent: self.items_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of forwarder metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwarderMetricsSnapshot {
    pub batches_sent: u64,
    pub items_sent: u64,
    pub bytes_sent: u64,
    pub send_failures: u64,
    pub connects: u64,
}

/// Batch handler forwarding each batch to a remote receiver
pub struct BatchForwarder<F: ClientFactory> {
    factory: F,
    client: Option<F::Client>,
    name: String,
    metrics: Arc<ForwarderMetrics>,
    failure_logger: RateLimitedLogger,
}

impl<F: ClientFactory> BatchForwarder<F> {
    /// Create a forwarder; no connection is made until the first batch
    pub fn new(factory: F) -> Self {
        Self::with_name(factory, "forwarder")
    }

    /// Create a forwarder with a custom name (used in logs)
    pub fn with_name(factory: F, name: impl Into<String>) -> Self {
        Self {
            factory,
            client: None,
            name: name.into(),
            metrics: Arc::new(ForwarderMetrics::new()),
            failure_logger: RateLimitedLogger::default(),
        }
    }

    /// Get the sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get reference to metrics
    pub fn metrics(&self) -> &ForwarderMetrics {
        &self.metrics
    }

    /// Shared metrics, valid after the sink moves into an executor
    pub fn metrics_handle(&self) -> Arc<ForwarderMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Whether a client is currently held
    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Return the current client, connecting if there is none
    async fn client(&mut self) -> Result<&mut F::Client, ForwarderError> {
        if self.client.as_ref().is_some_and(|client| !client.is_active()) {
            tracing::debug!(sink = %self.name, "discarding inactive client");
            self.reset().await;
        }

        if self.client.is_none() {
            let client = self.factory.connect().await?;
            self.metrics.record_connect();
            tracing::debug!(
                sink = %self.name,
                target = %self.factory.target(),
                "connected to target"
            );
            self.client = Some(client);
        }

        self.client.as_mut().ok_or(ForwarderError::NoConnection)
    }

    /// Close and drop the current client
    async fn reset(&mut self) {
        if let Some(mut client) = self.client.take() {
            client.close().await;
        }
    }

    async fn send(&mut self, frame: Bytes) -> Result<(), ForwarderError> {
        self.client().await?.append_batch(frame).await
    }
}

#[async_trait]
impl<T, F> BatchHandler<T> for BatchForwarder<F>
where
    T: AsRef<[u8]> + Send + Sync + 'static,
    F: ClientFactory,
{
    async fn handle(&mut self, batch: &[T]) -> bool {
        let frame = match frame::encode_batch(batch) {
            Ok(frame) => frame,
            Err(e) => {
                // Resending the same batch can never succeed
                tracing::error!(
                    sink = %self.name,
                    batch_size = batch.len(),
                    error = %e,
                    "batch cannot be framed, dropping it"
                );
                self.metrics.record_failure();
                return true;
            }
        };
        let frame_len = frame.len() as u64;

        match self.send(frame).await {
            Ok(()) => {
                self.metrics.record_sent(batch.len() as u64, frame_len);
                true
            }
            Err(e) => {
                self.metrics.record_failure();
                if let Some(suppressed) = self.failure_logger.check() {
                    tracing::warn!(
                        sink = %self.name,
                        target = %self.factory.target(),
                        batch_size = batch.len(),
                        error = %e,
                        suppressed_count = suppressed,
                        "send batch failed, will retry on a new connection"
                    );
                }
                self.reset().await;
                false
            }
        }
    }

    async fn finalize(&mut self) -> Result<(), HandlerError> {
        self.reset().await;

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            sink = %self.name,
            batches_sent = snapshot.batches_sent,
            items_sent = snapshot.items_sent,
            bytes_sent = snapshot.bytes_sent,
            send_failures = snapshot.send_failures,
            connects = snapshot.connects,
            "forwarder sink shutting down"
        );
        Ok(())
    }
}

impl<F: ClientFactory> std::fmt::Debug for BatchForwarder<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchForwarder")
            .field("name", &self.name)
            .field("target", &self.factory.target())
            .field("connected", &self.client.is_some())
            .finish()
    }
}
