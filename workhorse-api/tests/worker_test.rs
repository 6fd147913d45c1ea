use std::time::Duration;

use async_trait::async_trait;
use workhorse_api::{
    BoxedWorker, QueueProcessor, Worker, WorkerContext, WorkerError, WorkerResult, WorkerState,
};

// Minimal worker that stops itself after a fixed number of steps
struct Countdown {
    remaining: u32,
    visited: Vec<WorkerState>,
}

#[async_trait]
impl Worker for Countdown {
    async fn step(&mut self, ctx: &WorkerContext) -> WorkerResult<()> {
        ctx.set_state(WorkerState::Batching);
        self.visited.push(ctx.state());
        self.remaining -= 1;
        if self.remaining == 0 {
            ctx.request_stop();
        }
        Ok(())
    }
}

// The loop shape every runtime follows, written out by hand
async fn run_to_completion<W: Worker>(worker: &mut W, ctx: &WorkerContext) -> WorkerResult<()> {
    if !ctx.try_mark_running() {
        return Err(WorkerError::AlreadyRunning);
    }
    ctx.set_state(WorkerState::Starting);
    worker.on_start(ctx).await?;
    while ctx.is_running() {
        worker.step(ctx).await?;
    }
    ctx.set_state(WorkerState::Stopping);
    worker.shutdown_hook(ctx).await;
    ctx.set_state(WorkerState::Stopped);
    Ok(())
}

#[tokio::test]
async fn test_worker_loop_shape() {
    let ctx = WorkerContext::new(Some("countdown".to_string()));
    let mut worker = Countdown { remaining: 3, visited: Vec::new() };

    run_to_completion(&mut worker, &ctx).await.unwrap();

    assert_eq!(worker.visited, vec![WorkerState::Batching; 3]);
    assert_eq!(ctx.state(), WorkerState::Stopped);
    assert!(!ctx.is_running());
}

#[tokio::test]
async fn test_default_flush_is_unsupported() {
    let ctx = WorkerContext::new(None);
    let mut worker = Countdown { remaining: 1, visited: Vec::new() };
    assert!(matches!(worker.flush(&ctx).await, Err(WorkerError::Unsupported)));
}

#[tokio::test]
async fn test_boxed_worker_delegates() {
    let ctx = WorkerContext::new(None);
    let mut boxed: BoxedWorker = Box::new(Countdown { remaining: 2, visited: Vec::new() });

    run_to_completion(&mut boxed, &ctx).await.unwrap();
    assert_eq!(ctx.state(), WorkerState::Stopped);

    // The context is free again once the loop has finished.
    assert!(ctx.try_mark_running());
}

#[tokio::test]
async fn test_state_change_stamps_time() {
    let ctx = WorkerContext::new(None);
    let before = ctx.last_state_change();

    tokio::time::sleep(Duration::from_millis(5)).await;
    ctx.set_state(WorkerState::Committing);

    assert!(ctx.last_state_change() > before);
    assert!(ctx.time_in_state() < Duration::from_millis(5));

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(ctx.time_in_state() >= Duration::from_millis(5));
}

struct Buffering {
    buffer: Vec<String>,
    flushed: Vec<String>,
}

#[async_trait]
impl QueueProcessor<String> for Buffering {
    async fn process(&mut self, item: String, ctx: &WorkerContext) -> WorkerResult<()> {
        ctx.set_state(WorkerState::Batching);
        self.buffer.push(item);
        Ok(())
    }

    async fn flush(&mut self, ctx: &WorkerContext) -> WorkerResult<usize> {
        ctx.set_state(WorkerState::Flushing);
        let count = self.buffer.len();
        self.flushed.append(&mut self.buffer);
        Ok(count)
    }
}

#[tokio::test]
async fn test_queue_processor_flush() {
    let ctx = WorkerContext::new(None);
    let mut processor = Buffering { buffer: Vec::new(), flushed: Vec::new() };

    for line in ["a", "b", "c"] {
        processor.process(line.to_string(), &ctx).await.unwrap();
    }
    assert_eq!(processor.flush(&ctx).await.unwrap(), 3);
    assert_eq!(ctx.state(), WorkerState::Flushing);
    assert_eq!(processor.flushed, vec!["a", "b", "c"]);

    // Default on_stop is a no-op.
    processor.on_stop(&ctx).await;
}
