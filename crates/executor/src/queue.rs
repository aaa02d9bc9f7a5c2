//! Producer/worker queue
//!
//! Wraps a tokio `mpsc` channel so the rest of the executor can treat the
//! bounded (backpressure) and unbounded (best-effort) modes the same way.
//! The sender half stays with the executor façade; the receiver half moves
//! into the worker task.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;

/// Create a queue; `capacity == 0` means unbounded
pub(crate) fn queue<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    if capacity > 0 {
        let (tx, rx) = mpsc::channel(capacity);
        (QueueSender::Bounded(tx), QueueReceiver::Bounded(rx))
    } else {
        // Unbounded channels do not expose their length, so occupancy is
        // tracked alongside: incremented before send, decremented on receipt.
        let (tx, rx) = mpsc::unbounded_channel();
        let len = Arc::new(AtomicUsize::new(0));
        (
            QueueSender::Unbounded {
                sender: tx,
                len: Arc::clone(&len),
            },
            QueueReceiver::Unbounded { receiver: rx, len },
        )
    }
}

/// Producer side of the queue
pub(crate) enum QueueSender<T> {
    Bounded(mpsc::Sender<T>),
    Unbounded {
        sender: mpsc::UnboundedSender<T>,
        len: Arc<AtomicUsize>,
    },
}

impl<T> QueueSender<T> {
    /// Send an item, suspending while a bounded queue is full
    ///
    /// Returns the item back if the worker has closed the queue.
    pub(crate) async fn send(&self, item: T) -> Result<(), T> {
        match self {
            Self::Bounded(sender) => sender.send(item).await.map_err(|e| e.0),
            Self::Unbounded { sender, len } => Self::send_unbounded(sender, len, item),
        }
    }

    /// Send an item from a thread outside the tokio runtime
    ///
    /// Blocks the calling thread while a bounded queue is full. Panics if
    /// called from within an async context, like `mpsc::Sender::blocking_send`.
    pub(crate) fn blocking_send(&self, item: T) -> Result<(), T> {
        match self {
            Self::Bounded(sender) => sender.blocking_send(item).map_err(|e| e.0),
            Self::Unbounded { sender, len } => Self::send_unbounded(sender, len, item),
        }
    }

    fn send_unbounded(
        sender: &mpsc::UnboundedSender<T>,
        len: &AtomicUsize,
        item: T,
    ) -> Result<(), T> {
        len.fetch_add(1, Ordering::SeqCst);
        sender.send(item).map_err(|e| {
            len.fetch_sub(1, Ordering::SeqCst);
            e.0
        })
    }

    /// Number of items currently queued
    #[inline]
    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Bounded(sender) => sender.max_capacity() - sender.capacity(),
            Self::Unbounded { len, .. } => len.load(Ordering::SeqCst),
        }
    }

    /// Configured capacity, `0` for unbounded
    #[inline]
    pub(crate) fn max_capacity(&self) -> usize {
        match self {
            Self::Bounded(sender) => sender.max_capacity(),
            Self::Unbounded { .. } => 0,
        }
    }

    /// Check if the worker side has closed the queue
    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        match self {
            Self::Bounded(sender) => sender.is_closed(),
            Self::Unbounded { sender, .. } => sender.is_closed(),
        }
    }
}

/// Worker side of the queue
pub(crate) enum QueueReceiver<T> {
    Bounded(mpsc::Receiver<T>),
    Unbounded {
        receiver: mpsc::UnboundedReceiver<T>,
        len: Arc<AtomicUsize>,
    },
}

impl<T> QueueReceiver<T> {
    /// Move up to `limit` items into `buffer`, waiting until at least one
    /// is available
    ///
    /// Returns `0` only once the queue is closed and empty. Cancel safe.
    pub(crate) async fn recv_many(&mut self, buffer: &mut Vec<T>, limit: usize) -> usize {
        match self {
            Self::Bounded(receiver) => receiver.recv_many(buffer, limit).await,
            Self::Unbounded { receiver, len } => {
                let received = receiver.recv_many(buffer, limit).await;
                len.fetch_sub(received, Ordering::SeqCst);
                received
            }
        }
    }

    /// Refuse further sends; producers waiting on a full queue are released
    pub(crate) fn close(&mut self) {
        match self {
            Self::Bounded(receiver) => receiver.close(),
            Self::Unbounded { receiver, .. } => receiver.close(),
        }
    }

    /// Number of items currently queued
    #[inline]
    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Bounded(receiver) => receiver.len(),
            Self::Unbounded { len, .. } => len.load(Ordering::SeqCst),
        }
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
