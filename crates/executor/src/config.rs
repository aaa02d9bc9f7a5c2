//! Executor configuration
//!
//! Fixed at construction; the executor never reconfigures itself at runtime.

use std::time::Duration;

use crate::error::{ExecutorError, Result};

/// Default number of items per batch
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default queue capacity (bounded)
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Default time budget for filling one batch
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Default pause between delivery attempts of a failed batch
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for an [`AsyncBatchExecutor`](crate::AsyncBatchExecutor)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Maximum number of items handed to the handler in one batch
    pub batch_size: usize,

    /// Queue capacity; `0` means unbounded
    pub queue_capacity: usize,

    /// Maximum time spent filling one batch before delivering what was drained
    pub drain_timeout: Duration,

    /// Wait between attempts after the handler rejects a batch
    pub retry_interval: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl ExecutorConfig {
    /// Create config with custom batch size (clamped to at least 1)
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Create config with a bounded queue of the given capacity
    ///
    /// A capacity of `0` selects an unbounded queue.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Create config with an unbounded queue
    #[must_use]
    pub fn unbounded(mut self) -> Self {
        self.queue_capacity = 0;
        self
    }

    /// Create config with custom drain timeout
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Create config with custom retry interval
    #[must_use]
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Whether producers block when the queue is full
    #[inline]
    pub fn is_bounded(&self) -> bool {
        self.queue_capacity > 0
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::InvalidConfig` for a zero batch size or a zero
    /// drain timeout.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ExecutorError::invalid_config(
                "batch_size",
                "must be greater than 0",
            ));
        }
        if self.drain_timeout.is_zero() {
            return Err(ExecutorError::invalid_config(
                "drain_timeout",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}
