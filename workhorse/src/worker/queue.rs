use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use tracing::{debug, info};
use workhorse_api::{QueueProcessor, Worker, WorkerContext, WorkerResult, WorkerState};

use crate::config::QueueWorkerConfig;
use crate::pool::queue::QueueConsumer;

/// A worker that pulls one item at a time from a shared queue and hands it to
/// a [`QueueProcessor`].
///
/// # Step
/// 1. Poll the queue for at most `poll_timeout` (state `Pulling`)
/// 2. On an item, run `process` (state `ExecutingBatch`)
/// 3. On an empty poll, sleep `empty_backoff` (state `Waiting`)
///
/// Any error from `process`, including `ResourceExhausted`, and a disconnected
/// queue end the worker. The item being processed is not retried.
pub struct QueueWorker<T, P> {
    queue: QueueConsumer<T>,
    processor: P,
    config: QueueWorkerConfig,
    processed: u64,
    _item: PhantomData<fn(T)>,
}

impl<T, P> QueueWorker<T, P>
where
    T: Send + 'static,
    P: QueueProcessor<T>,
{
    pub fn new(queue: QueueConsumer<T>, processor: P, config: QueueWorkerConfig) -> Self {
        Self {
            queue,
            processor,
            config,
            processed: 0,
            _item: PhantomData,
        }
    }

    /// Items handed to the processor so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn into_processor(self) -> P {
        self.processor
    }
}

impl<T, P> fmt::Debug for QueueWorker<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueWorker")
            .field("queue", &self.queue)
            .field("config", &self.config)
            .field("processed", &self.processed)
            .finish()
    }
}

#[async_trait]
impl<T, P> Worker for QueueWorker<T, P>
where
    T: Send + 'static,
    P: QueueProcessor<T>,
{
    async fn step(&mut self, ctx: &WorkerContext) -> WorkerResult<()> {
        ctx.set_state(WorkerState::Pulling);

        match self.queue.poll(self.config.poll_timeout).await? {
            Some(item) => {
                ctx.set_state(WorkerState::ExecutingBatch);
                self.processed += 1;
                self.processor.process(item, ctx).await
            }
            None => {
                ctx.set_state(WorkerState::Waiting);
                tokio::time::sleep(self.config.empty_backoff).await;
                Ok(())
            }
        }
    }

    async fn flush(&mut self, ctx: &WorkerContext) -> WorkerResult<usize> {
        self.processor.flush(ctx).await
    }

    async fn shutdown_hook(&mut self, ctx: &WorkerContext) {
        self.processor.on_stop(ctx).await;
        debug!(worker = %ctx.name(), remaining = self.queue.len(), "queue worker detached");
        info!(worker = %ctx.name(), processed = self.processed, "queue worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::queue::WorkQueue;
    use crate::worker::{spawn_worker, WorkerExit};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::runtime::Handle;
    use workhorse_api::WorkerError;

    #[derive(Clone, Default)]
    struct Collect {
        seen: Arc<Mutex<Vec<u32>>>,
        stops: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl QueueProcessor<u32> for Collect {
        async fn process(&mut self, item: u32, _ctx: &WorkerContext) -> WorkerResult<()> {
            if item == 99 {
                return Err(WorkerError::ResourceExhausted("out of file handles".into()));
            }
            self.seen.lock().unwrap().push(item);
            Ok(())
        }

        async fn on_stop(&mut self, _ctx: &WorkerContext) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fast_config() -> QueueWorkerConfig {
        QueueWorkerConfig {
            poll_timeout: Duration::from_millis(10),
            empty_backoff: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_processes_items_in_order() {
        let queue = WorkQueue::new(16);
        for i in 0..5 {
            queue.offer(i, Duration::from_millis(10)).await.unwrap();
        }

        let processor = Collect::default();
        let worker = QueueWorker::new(queue.consumer(), processor.clone(), fast_config());
        let handle = spawn_worker(worker, WorkerContext::new(None), &Handle::current()).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(handle.state(), WorkerState::Pulling | WorkerState::Waiting));
        handle.request_stop();
        let (worker, exit) = handle.join().await;

        assert_eq!(exit, WorkerExit::Completed);
        assert_eq!(worker.unwrap().processed(), 5);
        assert_eq!(*processor.seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(processor.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resource_exhaustion_stops_worker() {
        let queue = WorkQueue::new(16);
        for item in [1, 99, 2] {
            queue.offer(item, Duration::from_millis(10)).await.unwrap();
        }

        let processor = Collect::default();
        let worker = QueueWorker::new(queue.consumer(), processor.clone(), fast_config());
        let handle = spawn_worker(worker, WorkerContext::new(None), &Handle::current()).unwrap();
        let (_, exit) = handle.join().await;

        assert!(matches!(exit, WorkerExit::Failed(ref reason) if reason.contains("out of file handles")));
        assert_eq!(*processor.seen.lock().unwrap(), vec![1]);
        // The item after the fatal one is left for other workers.
        assert_eq!(queue.len(), 1);
        assert_eq!(processor.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disconnected_queue_stops_worker() {
        let queue: WorkQueue<u32> = WorkQueue::new(4);
        let worker = QueueWorker::new(queue.consumer(), Collect::default(), fast_config());
        drop(queue);

        let handle = spawn_worker(worker, WorkerContext::new(None), &Handle::current()).unwrap();
        let (_, exit) = handle.join().await;
        assert_eq!(exit, WorkerExit::Failed(WorkerError::QueueDisconnected.to_string()));
    }

    #[tokio::test]
    async fn test_flush_without_processor_support() {
        let queue: WorkQueue<u32> = WorkQueue::new(4);
        let mut worker = QueueWorker::new(queue.consumer(), Collect::default(), fast_config());
        let ctx = WorkerContext::new(None);
        assert!(matches!(worker.flush(&ctx).await, Err(WorkerError::Unsupported)));
    }
}
