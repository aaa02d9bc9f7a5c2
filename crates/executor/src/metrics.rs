//! Executor metrics
//!
//! Atomic counters for tracking producer and worker activity.
//! All operations use relaxed ordering; values are eventually consistent.
//!
//! # Metrics Handle Pattern
//!
//! The executor keeps its counters in an `Arc<ExecutorMetrics>` and hands out
//! `ExecutorMetricsHandle`s that also read live queue occupancy. A handle can
//! be moved into a reporting task independently of the executor.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::queue::QueueSender;

/// Counters for one executor
#[derive(Debug, Default)]
pub struct ExecutorMetrics {
    /// Items accepted into the queue
    items_enqueued: AtomicU64,

    /// Items dropped because the executor was not started or already stopped
    items_rejected: AtomicU64,

    /// Items lost because the queue closed while the producer was waiting
    items_interrupted: AtomicU64,

    /// Batches the handler reported as delivered
    batches_delivered: AtomicU64,

    /// Items contained in delivered batches
    items_delivered: AtomicU64,

    /// Delivery attempts the handler rejected
    delivery_failures: AtomicU64,

    /// Drains that left more than one batch worth of items queued
    backlog_events: AtomicU64,
}

impl ExecutorMetrics {
    /// Create new metrics instance with all counters at zero
    #[inline]
    pub const fn new() -> Self {
        Self {
            items_enqueued: AtomicU64::new(0),
            items_rejected: AtomicU64::new(0),
            items_interrupted: AtomicU64::new(0),
            batches_delivered: AtomicU64::new(0),
            items_delivered: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            backlog_events: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn record_enqueued(&self) {
        self.items_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_rejected(&self) {
        self.items_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_interrupted(&self) {
        self.items_interrupted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_delivered(&self, items: u64) {
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
        self.items_delivered.fetch_add(items, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_delivery_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_backlog(&self) {
        self.backlog_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time copy of all counters
    ///
    /// Queue occupancy is not tracked here; use
    /// [`ExecutorMetricsHandle::snapshot`] for a snapshot that includes it.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_enqueued: self.items_enqueued.load(Ordering::Relaxed),
            items_rejected: self.items_rejected.load(Ordering::Relaxed),
            items_interrupted: self.items_interrupted.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            items_delivered: self.items_delivered.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            backlog_events: self.backlog_events.load(Ordering::Relaxed),
            queue_size: 0,
            queue_capacity: 0,
        }
    }
}

/// Point-in-time snapshot of executor metrics
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub items_enqueued: u64,
    pub items_rejected: u64,
    pub items_interrupted: u64,
    pub batches_delivered: u64,
    pub items_delivered: u64,
    pub delivery_failures: u64,
    pub backlog_events: u64,
    pub queue_size: usize,
    /// `0` for an unbounded queue
    pub queue_capacity: usize,
}

impl MetricsSnapshot {
    /// Queue fill fraction in `[0, 1]`; always `0` for an unbounded queue
    pub fn fill_fraction(&self) -> f32 {
        fill_fraction(self.queue_size, self.queue_capacity)
    }
}

/// Fill fraction of a queue, `0` when unbounded
#[inline]
pub(crate) fn fill_fraction(size: usize, capacity: usize) -> f32 {
    if capacity == 0 {
        return 0.0;
    }
    size as f32 / capacity as f32
}

/// Handle for reading executor metrics from another task
///
/// Holds the counters and the queue occupancy source, so it stays valid for
/// as long as it is held.
pub struct ExecutorMetricsHandle<T> {
    name: Arc<str>,
    metrics: Arc<ExecutorMetrics>,
    queue: Arc<QueueSender<T>>,
}

impl<T> ExecutorMetricsHandle<T> {
    pub(crate) fn new(
        name: Arc<str>,
        metrics: Arc<ExecutorMetrics>,
        queue: Arc<QueueSender<T>>,
    ) -> Self {
        Self {
            name,
            metrics,
            queue,
        }
    }

    /// Executor name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a snapshot including current queue occupancy
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_size: self.queue.len(),
            queue_capacity: self.queue.max_capacity(),
            ..self.metrics.snapshot()
        }
    }
}

impl<T> Clone for ExecutorMetricsHandle<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            metrics: Arc::clone(&self.metrics),
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T> std::fmt::Debug for ExecutorMetricsHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorMetricsHandle")
            .field("name", &self.name)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
