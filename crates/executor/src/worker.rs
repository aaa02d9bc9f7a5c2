//! Batch worker - the single consumer of the queue
//!
//! # Design
//!
//! - Items are drained into a batch until `batch_size` items are collected or
//!   `drain_timeout` elapses, whichever comes first
//! - A non-empty batch is handed to the handler; on `false` the worker sleeps
//!   for `retry_interval` and resubmits the same batch, with no retry limit
//! - The batch is only cleared after the handler reports success
//! - Shutdown closes the queue, delivers everything still queued and then
//!   finalizes the handler exactly once

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ExecutorConfig;
use crate::handler::BatchHandler;
use crate::metrics::ExecutorMetrics;
use crate::queue::QueueReceiver;
use crate::rate_limited_logger::RateLimitedLogger;

#[cfg(test)]
#[path = "worker_test.rs"]
mod tests;

/// State shared between the façade, producers and the worker
///
/// Flush progress is tracked with two monotonic counters: `accepted` counts
/// items admitted by `enqueue` before they are sent, `settled` counts items
/// that reached a final outcome (delivered, or lost to an interrupted
/// enqueue). Everything admitted before a flush is settled once
/// `settled >= accepted` as read at the start of that flush.
#[derive(Debug)]
pub(crate) struct Shared {
    /// Producers may enqueue (Started state)
    pub(crate) accepting: AtomicBool,

    accepted: AtomicU64,
    settled: AtomicU64,
    settled_notify: Notify,

    /// Cancelled once the handler has been finalized
    finished: CancellationToken,

    pub(crate) metrics: Arc<ExecutorMetrics>,
}

impl Shared {
    pub(crate) fn new(metrics: Arc<ExecutorMetrics>) -> Self {
        Self {
            accepting: AtomicBool::new(false),
            accepted: AtomicU64::new(0),
            settled: AtomicU64::new(0),
            settled_notify: Notify::new(),
            finished: CancellationToken::new(),
            metrics,
        }
    }

    #[inline]
    pub(crate) fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Admit one item; must be followed by a send or a `settle(1)`
    #[inline]
    pub(crate) fn admit(&self) {
        self.accepted.fetch_add(1, Ordering::SeqCst);
    }

    /// Mark items as finished and wake flush waiters
    pub(crate) fn settle(&self, count: usize) {
        self.settled.fetch_add(count as u64, Ordering::SeqCst);
        self.settled_notify.notify_waiters();
    }

    /// Whether the worker has finalized the handler
    #[inline]
    pub(crate) fn is_finished(&self) -> bool {
        self.finished.is_cancelled()
    }

    /// Wait until the worker has finalized the handler
    pub(crate) async fn wait_finished(&self) {
        self.finished.cancelled().await;
    }

    /// Wait until every item admitted so far has settled
    pub(crate) async fn wait_settled(&self) {
        let target = self.accepted.load(Ordering::SeqCst);
        loop {
            let notified = self.settled_notify.notified();
            tokio::pin!(notified);
            // Register before checking so a settle in between is not missed
            notified.as_mut().enable();

            if self.settled.load(Ordering::SeqCst) >= target {
                return;
            }
            notified.await;
        }
    }
}

/// The consumer loop; owns the queue receiver, the handler and the batch
pub(crate) struct BatchWorker<T, H> {
    name: Arc<str>,
    config: ExecutorConfig,
    queue: QueueReceiver<T>,
    handler: H,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    backlog_logger: RateLimitedLogger,
    failure_logger: RateLimitedLogger,
}

impl<T, H> BatchWorker<T, H>
where
    T: Send + Sync + 'static,
    H: BatchHandler<T>,
{
    pub(crate) fn new(
        name: Arc<str>,
        config: ExecutorConfig,
        queue: QueueReceiver<T>,
        handler: H,
        shared: Arc<Shared>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            name,
            config,
            queue,
            handler,
            shared,
            shutdown,
            backlog_logger: RateLimitedLogger::default(),
            failure_logger: RateLimitedLogger::default(),
        }
    }

    /// Run until shutdown is requested or every sender is gone
    ///
    /// Spawned as a tokio task by `AsyncBatchExecutor::start`.
    pub(crate) async fn run(mut self) {
        tracing::info!(
            executor = %self.name,
            batch_size = self.config.batch_size,
            queue_capacity = self.config.queue_capacity,
            drain_timeout_ms = self.config.drain_timeout.as_millis() as u64,
            retry_interval_ms = self.config.retry_interval.as_millis() as u64,
            "batch worker starting"
        );

        let mut batch: Vec<T> = Vec::with_capacity(self.config.batch_size);

        loop {
            // Let producers run first; tokio has no task priorities
            tokio::task::yield_now().await;

            if self.shutdown.is_cancelled() {
                break;
            }

            let open = self.drain(&mut batch).await;
            self.check_backlog();
            self.deliver(&mut batch).await;

            if !open {
                tracing::debug!(executor = %self.name, "all producers gone, shutting down");
                break;
            }
        }

        self.drain_and_finalize(&mut batch).await;
    }

    /// Finalize a handler whose worker was never started
    pub(crate) async fn finalize_unstarted(mut self) {
        tracing::debug!(executor = %self.name, "finalizing handler of unstarted executor");
        self.finalize().await;
    }

    /// Fill the batch from the queue within the drain budget
    ///
    /// Returns `false` once the queue is closed and empty.
    async fn drain(&mut self, batch: &mut Vec<T>) -> bool {
        let deadline = Instant::now() + self.config.drain_timeout;

        while batch.len() < self.config.batch_size {
            let limit = self.config.batch_size - batch.len();

            tokio::select! {
                biased;

                received = self.queue.recv_many(batch, limit) => {
                    if received == 0 {
                        return false;
                    }
                }

                () = tokio::time::sleep_until(deadline) => break,

                // Wake early; the run loop re-checks the token
                () = self.shutdown.cancelled() => break,
            }
        }

        true
    }

    /// Deliver the batch, retrying the identical batch until it succeeds
    async fn deliver(&mut self, batch: &mut Vec<T>) {
        if batch.is_empty() {
            return;
        }

        let mut attempts: u64 = 1;
        while !self.handler.handle(batch.as_slice()).await {
            self.shared.metrics.record_delivery_failure();

            if let Some(suppressed) = self.failure_logger.check() {
                tracing::warn!(
                    executor = %self.name,
                    batch_size = batch.len(),
                    attempt = attempts,
                    suppressed_count = suppressed,
                    retry_in_ms = self.config.retry_interval.as_millis() as u64,
                    "batch delivery failed, retrying"
                );
            }

            tokio::time::sleep(self.config.retry_interval).await;
            self.check_backlog();
            attempts += 1;
        }

        let delivered = batch.len();
        batch.clear();

        self.shared.metrics.record_delivered(delivered as u64);
        self.shared.settle(delivered);

        if attempts > 1 {
            tracing::info!(
                executor = %self.name,
                batch_size = delivered,
                attempts,
                "batch delivered after retries"
            );
        } else {
            tracing::trace!(executor = %self.name, batch_size = delivered, "batch delivered");
        }
    }

    /// Warn when more than one batch worth of items is waiting
    fn check_backlog(&self) {
        let queued = self.queue.len();
        if queued <= self.config.batch_size {
            return;
        }

        self.shared.metrics.record_backlog();
        if let Some(suppressed) = self.backlog_logger.check() {
            tracing::warn!(
                executor = %self.name,
                queue_size = queued,
                batch_size = self.config.batch_size,
                suppressed_count = suppressed,
                "queue size exceeds batch size, handler is falling behind"
            );
        }
    }

    /// Close the queue, deliver what is left and finalize the handler
    async fn drain_and_finalize(mut self, batch: &mut Vec<T>) {
        self.queue.close();
        self.deliver(batch).await;

        loop {
            let received = self.queue.recv_many(batch, self.config.batch_size).await;
            if received == 0 {
                break;
            }
            self.deliver(batch).await;
        }

        debug_assert!(self.queue.is_empty());
        self.finalize().await;

        let snapshot = self.shared.metrics.snapshot();
        tracing::info!(
            executor = %self.name,
            items_enqueued = snapshot.items_enqueued,
            batches_delivered = snapshot.batches_delivered,
            items_delivered = snapshot.items_delivered,
            delivery_failures = snapshot.delivery_failures,
            backlog_events = snapshot.backlog_events,
            "batch worker stopped"
        );
    }

    async fn finalize(&mut self) {
        if let Err(e) = self.handler.finalize().await {
            tracing::error!(
                executor = %self.name,
                error = %e,
                "handler finalize failed"
            );
        }
        self.shared.finished.cancel();
    }
}
