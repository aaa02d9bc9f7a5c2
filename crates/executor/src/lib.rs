//! Batchline - Executor
//!
//! Decouples producers of discrete items from a handler that can only deliver
//! efficiently in batches (a file, a remote endpoint).
//!
//! # Architecture
//!
//! ```text
//! [Producers]                   [Queue]                 [Worker]               [Handler]
//!    task ────┐
//!    task ────┼──→ enqueue ──→ mpsc (bounded or ──→ drain ≤ batch_size ──→ handle(&[T]) ──→ Destination
//!    thread ──┘                  unbounded)          within drain_timeout      │
//!                                                          ▲                   │ false
//!                                                          └── retry_interval ─┘
//! ```
//!
//! # Key Design
//!
//! - **Single consumer**: exactly one worker task drains the queue, so batches
//!   are delivered strictly in order and `handle` is never called concurrently
//! - **Backpressure**: a bounded queue suspends producers when full
//! - **Retry until delivered**: a failed batch is resubmitted verbatim after
//!   `retry_interval`, forever; a stuck handler stalls the pipeline visibly
//! - **Ownership**: the in-flight batch and the handler live inside the worker
//!   task; producers only ever touch the channel sender
//! - **Signal-based flush**: `flush()` waits on a notification raised by the
//!   worker until every item enqueued before the call has been delivered
//!
//! # Example
//!
//! ```ignore
//! use batchline_executor::{AsyncBatchExecutor, ExecutorConfig};
//!
//! let config = ExecutorConfig::default().with_batch_size(500);
//! let executor = AsyncBatchExecutor::create_and_start(config, handler)?;
//!
//! executor.enqueue("line".to_string()).await;
//! executor.flush().await;
//! executor.stop().await;
//! ```

mod config;
mod error;
mod executor;
mod handler;
mod metrics;
mod queue;
mod rate_limited_logger;
mod worker;

pub use config::{
    ExecutorConfig, DEFAULT_BATCH_SIZE, DEFAULT_DRAIN_TIMEOUT, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_RETRY_INTERVAL,
};
pub use error::{ExecutorError, HandlerError, Result};
pub use executor::{AsyncBatchExecutor, EnqueueOutcome, ExecutorState};
pub use handler::BatchHandler;
pub use metrics::{ExecutorMetrics, ExecutorMetricsHandle, MetricsSnapshot};
pub use rate_limited_logger::{RateLimitedLogger, DEFAULT_LOG_INTERVAL};
