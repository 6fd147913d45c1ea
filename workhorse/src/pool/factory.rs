use std::fmt;
use std::marker::PhantomData;

use workhorse_api::{BoxedWorker, FactoryError, QueueProcessor};

use crate::config::QueueWorkerConfig;
use crate::pool::queue::QueueConsumer;
use crate::worker::QueueWorker;

/// Produces the workers of an elastic pool.
///
/// Every worker is bound to the pool's shared queue through the consumer
/// handed to `make_worker`. Workers the pool retires, whether they stopped on
/// request or died, are given back through `destroy_worker`.
pub trait WorkerFactory<T: Send + 'static>: Send + Sync + 'static {
    fn make_worker(&self, queue: QueueConsumer<T>) -> Result<BoxedWorker, FactoryError>;

    /// Release a retired worker. The default just drops it.
    fn destroy_worker(&self, worker: BoxedWorker) {
        drop(worker);
    }
}

type MakeProcessor<P> = dyn Fn() -> Result<P, FactoryError> + Send + Sync;

/// Builds a [`QueueWorker`] around a fresh processor for every worker the
/// pool asks for.
pub struct QueueProcessorFactory<T, P> {
    make: Box<MakeProcessor<P>>,
    config: QueueWorkerConfig,
    _item: PhantomData<fn(T)>,
}

impl<T, P> QueueProcessorFactory<T, P>
where
    T: Send + 'static,
    P: QueueProcessor<T>,
{
    pub fn new<F>(config: QueueWorkerConfig, make: F) -> Self
    where
        F: Fn() -> P + Send + Sync + 'static,
    {
        Self::try_new(config, move || Ok(make()))
    }

    /// Like [`QueueProcessorFactory::new`] for processors whose construction
    /// can fail, for example because a connection pool is exhausted.
    pub fn try_new<F>(config: QueueWorkerConfig, make: F) -> Self
    where
        F: Fn() -> Result<P, FactoryError> + Send + Sync + 'static,
    {
        Self {
            make: Box::new(make),
            config,
            _item: PhantomData,
        }
    }

    pub fn config(&self) -> &QueueWorkerConfig {
        &self.config
    }
}

impl<T, P> WorkerFactory<T> for QueueProcessorFactory<T, P>
where
    T: Send + 'static,
    P: QueueProcessor<T>,
{
    fn make_worker(&self, queue: QueueConsumer<T>) -> Result<BoxedWorker, FactoryError> {
        let processor = (self.make)()?;
        Ok(Box::new(QueueWorker::new(queue, processor, self.config.clone())))
    }
}

impl<T, P> fmt::Debug for QueueProcessorFactory<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueProcessorFactory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
