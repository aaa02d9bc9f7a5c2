//! Batch handler contract
//!
//! The one seam between the executor and a destination. Implementations are
//! owned by the worker task, so `handle` and `finalize` are never called
//! concurrently.

use async_trait::async_trait;

use crate::error::HandlerError;

/// Downstream consumer of batches
///
/// # Contract
///
/// - `handle` returns `true` once the whole batch is delivered. Returning
///   `false` makes the worker sleep for the retry interval and call `handle`
///   again with the identical batch, indefinitely.
/// - Ordinary delivery failures must be reported as `false`, not panics.
/// - A handler that partially delivers before failing owns its idempotency;
///   the executor does no deduplication.
/// - `finalize` is called exactly once, after the last `handle`.
#[async_trait]
pub trait BatchHandler<T>: Send + 'static
where
    T: Send + Sync + 'static,
{
    /// Attempt to deliver the batch
    async fn handle(&mut self, batch: &[T]) -> bool;

    /// Release resources held by the handler
    async fn finalize(&mut self) -> Result<(), HandlerError>;
}

#[async_trait]
impl<T, H> BatchHandler<T> for Box<H>
where
    T: Send + Sync + 'static,
    H: BatchHandler<T> + ?Sized,
{
    async fn handle(&mut self, batch: &[T]) -> bool {
        (**self).handle(batch).await
    }

    async fn finalize(&mut self) -> Result<(), HandlerError> {
        (**self).finalize().await
    }
}
