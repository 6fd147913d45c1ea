use async_trait::async_trait;

use crate::context::WorkerContext;
use crate::errors::WorkerError;
use crate::types::WorkerResult;

/// Core worker trait.
///
/// A worker is driven by a runtime loop of the shape
///
/// ```text
/// on_start()
/// while running { step() }
/// shutdown_hook()
/// ```
///
/// The loop owns the worker exclusively, so implementations keep their own
/// buffers and connections in plain fields. Everything the outside world may
/// observe (run flag, state, cancel signal) lives in the [`WorkerContext`].
#[async_trait]
pub trait Worker: Send + 'static {
    /// Implementation-specific setup, run once after the run flag is set and
    /// before the first `step`. An error here ends the worker without looping.
    async fn on_start(&mut self, _ctx: &WorkerContext) -> WorkerResult<()> {
        Ok(())
    }

    /// One unit of work. An error (or panic) ends the loop; the runtime never
    /// retries a failed step.
    async fn step(&mut self, ctx: &WorkerContext) -> WorkerResult<()>;

    /// Drain buffered work synchronously and return how many items were
    /// flushed. Workers without buffers keep the default.
    async fn flush(&mut self, _ctx: &WorkerContext) -> WorkerResult<usize> {
        Err(WorkerError::Unsupported)
    }

    /// Called exactly once after the loop exits, whatever the reason.
    async fn shutdown_hook(&mut self, ctx: &WorkerContext) {
        tracing::info!(worker = %ctx.name(), state = %ctx.state(), "worker loop finished");
    }
}

#[async_trait]
impl<W: Worker + ?Sized> Worker for Box<W> {
    async fn on_start(&mut self, ctx: &WorkerContext) -> WorkerResult<()> {
        (**self).on_start(ctx).await
    }

    async fn step(&mut self, ctx: &WorkerContext) -> WorkerResult<()> {
        (**self).step(ctx).await
    }

    async fn flush(&mut self, ctx: &WorkerContext) -> WorkerResult<usize> {
        (**self).flush(ctx).await
    }

    async fn shutdown_hook(&mut self, ctx: &WorkerContext) {
        (**self).shutdown_hook(ctx).await
    }
}
