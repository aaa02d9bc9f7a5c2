//! Executor façade
//!
//! `AsyncBatchExecutor` is what producers and operators hold. It owns the
//! sender half of the queue and the worker's lifecycle:
//!
//! ```text
//! Created ──start()──→ Started ──stop()──→ Stopping ──→ Stopped
//!    └──────────────────stop()──────────────↗
//! ```
//!
//! Stopped is only reported once the handler has been finalized.
//!
//! Enqueues are only accepted while Started. Anything enqueued before
//! `start()` or after `stop()` is dropped and reported as
//! [`EnqueueOutcome::NotAccepting`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::ExecutorConfig;
use crate::error::{ExecutorError, Result};
use crate::handler::BatchHandler;
use crate::metrics::{self, ExecutorMetrics, ExecutorMetricsHandle};
use crate::queue::{self as batch_queue, QueueSender};
use crate::worker::{BatchWorker, Shared};

#[cfg(test)]
#[path = "executor_test.rs"]
mod executor_test;

/// Numbers worker spans across executors in one process
static WORKER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Lifecycle state of an executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    /// Constructed, worker not running, enqueues dropped
    Created,
    /// Worker running, enqueues accepted
    Started,
    /// `stop()` in progress: backlog being delivered, enqueues dropped
    Stopping,
    /// Terminal; handler finalized
    Stopped,
}

impl ExecutorState {
    /// Lowercase name for logs and errors
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to an enqueued item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The item is in the queue and will be delivered
    Accepted,
    /// The executor is not started or already stopped; the item was dropped
    NotAccepting,
    /// The queue closed (or the enqueue was cancelled) while waiting for
    /// space; the item was dropped
    Interrupted,
}

impl EnqueueOutcome {
    /// Check if the item made it into the queue
    #[inline]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

enum Lifecycle<T, H> {
    Created(BatchWorker<T, H>),
    Started(JoinHandle<()>),
    Stopping,
    Stopped,
}

impl<T, H> Lifecycle<T, H> {
    fn state(&self) -> ExecutorState {
        match self {
            Self::Created(_) => ExecutorState::Created,
            Self::Started(_) => ExecutorState::Started,
            Self::Stopping => ExecutorState::Stopping,
            Self::Stopped => ExecutorState::Stopped,
        }
    }
}

/// Settles an admitted item unless the send completes
///
/// Covers both a closed queue and a producer future dropped mid-wait.
struct AdmissionGuard<'a> {
    shared: &'a Shared,
    name: &'a str,
    armed: bool,
}

impl<'a> AdmissionGuard<'a> {
    fn new(shared: &'a Shared, name: &'a str) -> Self {
        shared.admit();
        Self {
            shared,
            name,
            armed: true,
        }
    }

    fn complete(mut self) {
        self.armed = false;
        self.shared.metrics.record_enqueued();
    }
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.metrics.record_interrupted();
            self.shared.settle(1);
            tracing::error!(
                executor = %self.name,
                "enqueue interrupted while waiting for queue space, item dropped"
            );
        }
    }
}

/// Asynchronous batch executor
///
/// Producers call [`enqueue`](Self::enqueue) (or
/// [`blocking_enqueue`](Self::blocking_enqueue) from plain threads); a single
/// worker task drains the queue into batches and hands them to the handler,
/// retrying a rejected batch until it is delivered.
///
/// Dropping a started executor without calling [`stop`](Self::stop) signals
/// the worker, which then delivers what is queued and finalizes the handler
/// in the background.
pub struct AsyncBatchExecutor<T, H> {
    name: Arc<str>,
    config: ExecutorConfig,
    queue: Arc<QueueSender<T>>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    lifecycle: Mutex<Lifecycle<T, H>>,
}

impl<T, H> AsyncBatchExecutor<T, H>
where
    T: Send + Sync + 'static,
    H: BatchHandler<T>,
{
    /// Create a new executor in the Created state
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::InvalidConfig` if the config fails validation.
    pub fn new(config: ExecutorConfig, handler: H) -> Result<Self> {
        Self::with_name(config, handler, "batch_executor")
    }

    /// Create a new executor with a custom name (used in logs)
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::InvalidConfig` if the config fails validation.
    pub fn with_name(config: ExecutorConfig, handler: H, name: impl Into<String>) -> Result<Self> {
        config.validate()?;

        let name: Arc<str> = Arc::from(name.into());
        let metrics = Arc::new(ExecutorMetrics::new());
        let shared = Arc::new(Shared::new(metrics));
        let shutdown = CancellationToken::new();
        let (sender, receiver) = batch_queue::queue(config.queue_capacity);

        let worker = BatchWorker::new(
            Arc::clone(&name),
            config.clone(),
            receiver,
            handler,
            Arc::clone(&shared),
            shutdown.clone(),
        );

        Ok(Self {
            name,
            config,
            queue: Arc::new(sender),
            shared,
            shutdown,
            lifecycle: Mutex::new(Lifecycle::Created(worker)),
        })
    }

    /// Create an executor and start it immediately
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or no tokio runtime is
    /// available.
    pub fn create_and_start(config: ExecutorConfig, handler: H) -> Result<Self> {
        let executor = Self::new(config, handler)?;
        executor.start()?;
        Ok(executor)
    }

    /// Spawn the worker and begin accepting enqueues
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::InvalidState` unless the executor is in the
    /// Created state, and `ExecutorError::NoRuntime` outside a runtime.
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ExecutorError::NoRuntime(self.name.to_string()))?;

        let mut lifecycle = self.lifecycle.lock();
        let worker = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Created(worker) => worker,
            other => {
                let state = other.state();
                *lifecycle = other;
                return Err(ExecutorError::InvalidState {
                    name: self.name.to_string(),
                    operation: "start",
                    state: state.as_str(),
                });
            }
        };

        let span = tracing::info_span!(
            "batch_worker",
            executor = %self.name,
            worker = WORKER_COUNTER.fetch_add(1, Ordering::Relaxed) + 1,
        );
        *lifecycle = Lifecycle::Started(runtime.spawn(worker.run().instrument(span)));
        self.shared.accepting.store(true, Ordering::SeqCst);

        tracing::info!(executor = %self.name, "executor started");
        Ok(())
    }

    /// Enqueue an item, waiting while a bounded queue is full
    ///
    /// Never fails: the outcome reports whether the item was queued. Dropping
    /// the returned future while it waits for space loses the item and counts
    /// as an interrupted enqueue.
    pub async fn enqueue(&self, item: T) -> EnqueueOutcome {
        if !self.shared.is_accepting() {
            self.shared.metrics.record_rejected();
            return EnqueueOutcome::NotAccepting;
        }

        let guard = AdmissionGuard::new(&self.shared, &self.name);
        match self.queue.send(item).await {
            Ok(()) => {
                guard.complete();
                EnqueueOutcome::Accepted
            }
            Err(_) => EnqueueOutcome::Interrupted,
        }
    }

    /// Enqueue an item from a thread outside the tokio runtime
    ///
    /// Blocks the calling thread while a bounded queue is full.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context; use
    /// [`enqueue`](Self::enqueue) there.
    pub fn blocking_enqueue(&self, item: T) -> EnqueueOutcome {
        if !self.shared.is_accepting() {
            self.shared.metrics.record_rejected();
            return EnqueueOutcome::NotAccepting;
        }

        let guard = AdmissionGuard::new(&self.shared, &self.name);
        match self.queue.blocking_send(item) {
            Ok(()) => {
                guard.complete();
                EnqueueOutcome::Accepted
            }
            Err(_) => EnqueueOutcome::Interrupted,
        }
    }

    /// Wait until everything enqueued before this call has been delivered
    ///
    /// Returns immediately on an executor that was never started. Does not
    /// return while the handler keeps rejecting a batch; wrap it in
    /// `tokio::time::timeout` for a bounded wait.
    pub async fn flush(&self) {
        self.shared.wait_settled().await;
    }

    /// Stop accepting items, deliver the backlog, stop the worker and
    /// finalize the handler
    ///
    /// Calling `stop` on a never-started executor only finalizes the handler.
    /// Concurrent and later calls wait for the same finalization.
    pub async fn stop(&self) {
        self.shared.accepting.store(false, Ordering::SeqCst);

        let previous = {
            let mut lifecycle = self.lifecycle.lock();
            match *lifecycle {
                Lifecycle::Stopping | Lifecycle::Stopped => None,
                _ => Some(std::mem::replace(&mut *lifecycle, Lifecycle::Stopping)),
            }
        };

        let Some(previous) = previous else {
            self.shared.wait_finished().await;
            return;
        };

        match previous {
            Lifecycle::Created(worker) => {
                self.shutdown.cancel();
                worker.finalize_unstarted().await;
            }
            Lifecycle::Started(task) => {
                tracing::info!(executor = %self.name, "executor stopping, flushing queue");
                // Dropping this future mid-stop still lets the worker finish
                let _shutdown = self.shutdown.clone().drop_guard();
                self.flush().await;
                self.shutdown.cancel();

                if let Err(e) = task.await {
                    tracing::error!(
                        executor = %self.name,
                        error = %e,
                        "batch worker terminated abnormally"
                    );
                }
            }
            Lifecycle::Stopping | Lifecycle::Stopped => {}
        }

        *self.lifecycle.lock() = Lifecycle::Stopped;
        tracing::info!(executor = %self.name, "executor stopped");
    }

    /// Current lifecycle state
    pub fn state(&self) -> ExecutorState {
        match self.lifecycle.lock().state() {
            ExecutorState::Stopping if self.shared.is_finished() => ExecutorState::Stopped,
            state => state,
        }
    }

    /// Executor name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Executor configuration
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Number of items waiting in the queue (excludes the in-flight batch)
    #[inline]
    pub fn queue_size(&self) -> usize {
        self.queue.len()
    }

    /// Configured queue capacity, `0` meaning unbounded
    #[inline]
    pub fn max_queue_size(&self) -> usize {
        self.config.queue_capacity
    }

    /// `queue_size / max_queue_size` for bounded queues, `0` when unbounded
    #[inline]
    pub fn fill_fraction(&self) -> f32 {
        metrics::fill_fraction(self.queue_size(), self.max_queue_size())
    }

    /// Get reference to metrics
    pub fn metrics(&self) -> &ExecutorMetrics {
        &self.shared.metrics
    }

    /// Get a metrics handle for reporting from another task
    pub fn metrics_handle(&self) -> ExecutorMetricsHandle<T> {
        ExecutorMetricsHandle::new(
            Arc::clone(&self.name),
            Arc::clone(&self.shared.metrics),
            Arc::clone(&self.queue),
        )
    }
}

impl<T, H> Drop for AsyncBatchExecutor<T, H> {
    fn drop(&mut self) {
        self.shared.accepting.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
    }
}

impl<T, H> std::fmt::Debug for AsyncBatchExecutor<T, H>
where
    T: Send + Sync + 'static,
    H: BatchHandler<T>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncBatchExecutor")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .field("queue_size", &self.queue.len())
            .field("closed", &self.queue.is_closed())
            .finish()
    }
}
