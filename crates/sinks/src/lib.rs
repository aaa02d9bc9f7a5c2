//! Batchline - Sinks
//!
//! Batch handlers that plug into `batchline_executor::AsyncBatchExecutor`.
//!
//! # Architecture
//!
//! Each sink implements `BatchHandler` and is owned by the executor's worker
//! task, so none of them needs internal locking:
//!
//! ```text
//! [Executor worker] --&[T]--> [Sink::handle] --> [Destination]
//!                                  │
//!                                  └── false ──→ batch retried by the worker
//! ```
//!
//! # Available Sinks
//!
//! | Sink | Destination | Failure policy |
//! |------|-------------|----------------|
//! | `LineFileWriter` | one append-only text file | log per line, never retry |
//! | `HourlyFileWriter` | one text file per UTC hour | retry if the file cannot be opened |
//! | `BatchForwarder` | remote receiver over TCP | drop connection, retry batch |
//!
//! # Example
//!
//! ```ignore
//! use batchline_executor::{AsyncBatchExecutor, ExecutorConfig};
//! use batchline_sinks::file::LineFileWriter;
//!
//! let sink = LineFileWriter::open("events.log")?;
//! let executor = AsyncBatchExecutor::create_and_start(ExecutorConfig::default(), sink)?;
//! executor.enqueue("first line".to_string()).await;
//! executor.stop().await;
//! ```

/// Line-oriented file sinks (single file and hourly rolling)
pub mod file;

/// Batch forwarding to a remote receiver
pub mod forwarder;
