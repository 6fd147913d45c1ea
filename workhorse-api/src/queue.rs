use async_trait::async_trait;

use crate::context::WorkerContext;
use crate::errors::WorkerError;
use crate::types::WorkerResult;

/// Per-item handler driven by a queue worker.
///
/// The queue worker pulls one item at a time from its shared input queue and
/// hands it to `process`. Any error returned here is fatal to that worker:
/// the item is considered delivered (at most once) and the worker stops.
/// Retrying belongs to whoever owns the pool.
#[async_trait]
pub trait QueueProcessor<T: Send + 'static>: Send + 'static {
    /// Handle a single item.
    async fn process(&mut self, item: T, ctx: &WorkerContext) -> WorkerResult<()>;

    /// Drain anything buffered by earlier `process` calls.
    async fn flush(&mut self, _ctx: &WorkerContext) -> WorkerResult<usize> {
        Err(WorkerError::Unsupported)
    }

    /// Release resources after the worker's loop has ended.
    async fn on_stop(&mut self, _ctx: &WorkerContext) {}
}
