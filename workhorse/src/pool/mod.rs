//! # Elastic Pool
//!
//! A controller that owns one bounded input queue and a resizable set of
//! queue workers consuming from it.
//!
//! ## Key Concepts
//! - Producers `offer` items into the shared queue, waiting at most a timeout
//!   for space
//! - Workers are built by a [`WorkerFactory`] and can be added or retired while
//!   the pool runs
//! - A supervisor task samples worker health every `report_interval`, reports
//!   it, and optionally replaces dead workers to hold the target count
//!
//! ## Shutdown Paths
//! - [`ElasticPool::soft_shutdown`]: clear every run flag, return immediately
//! - [`ElasticPool::hard_shutdown`]: also interrupt every worker and stop the
//!   supervisor; queued and in-flight items may be lost
//! - [`ElasticPool::shutdown`]: stop accepting items, let the queue drain, wait
//!   for every worker to finish and report how each one ended
//!
//! ## Thread Safety
//! - The worker set lives behind the pool's mutex, never held across an await
//! - The queue is the only resource the workers share

pub mod factory;
pub mod queue;
pub mod reporter;
mod supervisor;

pub use factory::{QueueProcessorFactory, WorkerFactory};
pub use queue::{QueueConsumer, WorkQueue};
pub use reporter::TracingReporter;

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn, Instrument};
use workhorse_api::{FactoryError, HealthReporter, HealthSnapshot, QueueProcessor, WorkerContext};

use crate::config::PoolConfig;
use crate::error::{ConfigError, PoolError, ShutdownReport, WorkerFailure};
use crate::worker::{spawn_worker, WorkerHandle, WorkerInfo};
use crate::{log_error, log_pool, pool_span};

/// Lifecycle of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PoolStatus {
    /// Built but not started; items may already be offered.
    Created = 0,
    Running = 1,
    /// No longer accepting items; workers are finishing.
    ShuttingDown = 2,
    Shutdown = 3,
}

impl PoolStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PoolStatus::Created,
            1 => PoolStatus::Running,
            2 => PoolStatus::ShuttingDown,
            _ => PoolStatus::Shutdown,
        }
    }
}

pub(crate) struct PoolInner<T: Send + 'static> {
    config: PoolConfig,
    queue: WorkQueue<T>,
    factory: Option<Arc<dyn WorkerFactory<T>>>,
    reporter: Arc<dyn HealthReporter>,
    runtime: Handle,
    workers: Mutex<Vec<WorkerHandle>>,
    status: AtomicU8,
    target: AtomicUsize,
    next_index: AtomicUsize,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> PoolInner<T> {
    fn workers(&self) -> MutexGuard<'_, Vec<WorkerHandle>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self) -> PoolStatus {
        PoolStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn transition(&self, from: PoolStatus, to: PoolStatus) -> bool {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Move to `ShuttingDown` unless the pool is already past it.
    ///
    /// Taken under the worker lock so a worker registered concurrently is
    /// either rejected or visible to the stop that follows.
    fn begin_shutdown(&self) {
        let _workers = self.workers();
        let _ = self.transition(PoolStatus::Created, PoolStatus::ShuttingDown)
            || self.transition(PoolStatus::Running, PoolStatus::ShuttingDown);
    }

    /// Build one worker and start it, unless the pool stopped running while
    /// the factory was busy. A rejected worker goes straight back to the factory.
    fn spawn_one(&self) -> Result<(), PoolError> {
        let factory = self
            .factory
            .as_ref()
            .ok_or(PoolError::Config(ConfigError::MissingFactory))?;
        let worker = factory.make_worker(self.queue.consumer())?;

        let mut workers = self.workers();
        if self.status() != PoolStatus::Running {
            drop(workers);
            debug!(pool = %self.config.name, status = ?self.status(), "discarding worker built during shutdown");
            factory.destroy_worker(worker);
            return Err(PoolError::ShuttingDown);
        }

        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let ctx = WorkerContext::new(Some(format!("{}-worker-{}", self.config.name, index)));
        let handle = spawn_worker(worker, ctx, &self.runtime)
            .map_err(|err| PoolError::from(FactoryError::CreationFailed(err.to_string())))?;

        debug!(pool = %self.config.name, worker = %handle.name(), "worker spawned");
        workers.push(handle);
        Ok(())
    }

    pub(crate) fn health_snapshot(&self) -> HealthSnapshot {
        let workers = self.workers();
        let mut snapshot = HealthSnapshot::default();
        for handle in workers.iter() {
            if handle.is_alive() {
                snapshot.alive += 1;
            } else {
                snapshot.dead += 1;
            }
            if handle.is_running() {
                snapshot.should_run += 1;
            } else {
                snapshot.should_not_run += 1;
            }
        }
        snapshot
    }

    fn soft_shutdown(&self) {
        self.begin_shutdown();
        for handle in self.workers().iter() {
            handle.request_stop();
        }
    }

    fn hard_shutdown(&self) -> usize {
        self.soft_shutdown();
        for handle in self.workers().iter() {
            handle.cancel();
        }
        self.stop_supervisor();
        self.mark_shutdown();

        let abandoned = self.queue.len();
        log_pool!(self.config.name, "hard_shutdown", abandoned);
        abandoned
    }

    fn mark_shutdown(&self) {
        let _workers = self.workers();
        self.status.store(PoolStatus::Shutdown as u8, Ordering::Release);
    }

    fn stop_supervisor(&self) {
        let supervisor = self.supervisor.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(supervisor) = supervisor {
            supervisor.abort();
        }
    }

    /// Remove finished workers from the set, hand them back to the factory and
    /// return how each one ended.
    pub(crate) async fn prune_dead(&self) -> Vec<WorkerFailure> {
        let dead: Vec<WorkerHandle> = {
            let mut workers = self.workers();
            let (dead, alive): (Vec<_>, Vec<_>) = workers.drain(..).partition(|handle| !handle.is_alive());
            *workers = alive;
            dead
        };
        self.retire(dead).await.1
    }

    async fn retire(&self, handles: Vec<WorkerHandle>) -> (usize, Vec<WorkerFailure>) {
        let mut joined = 0;
        let mut failures = Vec::new();

        for handle in handles {
            let id = handle.id();
            let name = handle.name().to_string();
            let (worker, exit) = handle.join().await;
            joined += 1;

            if exit.is_failure() {
                warn!(pool = %self.config.name, worker = %name, exit = %exit, "worker ended abnormally");
                failures.push(WorkerFailure { id, name, exit });
            } else {
                debug!(pool = %self.config.name, worker = %name, exit = %exit, "worker retired");
            }

            if let (Some(worker), Some(factory)) = (worker, self.factory.as_ref()) {
                factory.destroy_worker(worker);
            }
        }

        (joined, failures)
    }

    /// Add workers until the set holds the target count.
    pub(crate) fn top_up(&self) -> usize {
        let target = self.target.load(Ordering::Acquire);
        let current = self.workers().len();
        let mut added = 0;

        for _ in current..target {
            match self.spawn_one() {
                Ok(()) => added += 1,
                Err(PoolError::ShuttingDown) => break,
                Err(err) => {
                    log_error!(err, pool = %self.config.name, "could not replace worker");
                    break;
                }
            }
        }
        added
    }
}

/// A bounded work queue consumed by a resizable set of queue workers.
///
/// # Example
///
/// ```rust,ignore
/// let pool = ElasticPool::builder(PoolConfig::named("errors"))
///     .processor(|| ErrorWriter::new(db.clone()))
///     .build()?;
/// pool.start(4)?;
/// pool.offer(record, Duration::from_millis(100)).await?;
/// let report = pool.shutdown().await;
/// ```
pub struct ElasticPool<T: Send + 'static> {
    inner: Arc<PoolInner<T>>,
}

impl<T: Send + 'static> ElasticPool<T> {
    pub fn builder(config: PoolConfig) -> ElasticPoolBuilder<T> {
        ElasticPoolBuilder {
            config,
            factory: None,
            reporter: None,
            runtime: None,
        }
    }

    /// Start `initial_count` workers and the supervisor.
    ///
    /// With `initial_count == 0` only the supervisor runs; workers can be
    /// added later. Unless the config sets `target_workers`, `initial_count`
    /// becomes the count the supervisor maintains.
    ///
    /// # Errors
    /// - [`PoolError::AlreadyStarted`] if called twice
    /// - [`PoolError::ShuttingDown`] after a shutdown began
    /// - [`PoolError::Config`] when workers are requested without a factory
    /// - [`PoolError::StartFailed`] when the factory fails; the pool is shut down
    pub fn start(&self, initial_count: usize) -> Result<(), PoolError> {
        let inner = &self.inner;
        if !inner.transition(PoolStatus::Created, PoolStatus::Running) {
            return Err(match inner.status() {
                PoolStatus::Running => PoolError::AlreadyStarted,
                _ => PoolError::ShuttingDown,
            });
        }

        let _span = pool_span!(inner.config.name, "start", workers = initial_count).entered();

        if initial_count > 0 && inner.factory.is_none() {
            inner.hard_shutdown();
            return Err(ConfigError::MissingFactory.into());
        }

        let target = inner.config.target_workers.unwrap_or(initial_count);
        inner.target.store(target, Ordering::Release);

        for _ in 0..initial_count {
            if let Err(err) = inner.spawn_one() {
                log_error!(err, pool = %inner.config.name, "worker creation failed during startup");
                inner.hard_shutdown();
                return Err(PoolError::StartFailed(err.to_string()));
            }
        }

        let supervisor = supervisor::spawn(&self.inner);
        *inner.supervisor.lock().unwrap_or_else(PoisonError::into_inner) = Some(supervisor);

        log_pool!(inner.config.name, "started", workers = initial_count, target_workers = target);
        Ok(())
    }

    /// Enqueue `item`, waiting at most `timeout` for space.
    ///
    /// Returns `Ok(false)` if the queue stayed full; the item is dropped.
    ///
    /// # Errors
    /// - [`PoolError::InvalidArgument`] for a zero timeout
    /// - [`PoolError::ShuttingDown`] once a shutdown has begun
    pub async fn offer(&self, item: T, timeout: Duration) -> Result<bool, PoolError> {
        match self.inner.status() {
            PoolStatus::ShuttingDown | PoolStatus::Shutdown => Err(PoolError::ShuttingDown),
            PoolStatus::Created | PoolStatus::Running => self.inner.queue.offer(item, timeout).await,
        }
    }

    /// Start one more worker and raise the maintained count by one.
    ///
    /// Factory failures are logged and reported as `false`.
    pub fn add_worker(&self) -> bool {
        let inner = &self.inner;
        if inner.status() != PoolStatus::Running {
            warn!(pool = %inner.config.name, status = ?inner.status(), "add_worker on an inactive pool");
            return false;
        }

        match inner.spawn_one() {
            Ok(()) => {
                let target = inner.target.fetch_add(1, Ordering::AcqRel) + 1;
                log_pool!(inner.config.name, "worker_added", total = inner.workers().len(), target_workers = target);
                true
            }
            Err(PoolError::ShuttingDown) => {
                warn!(pool = %inner.config.name, "pool stopped while the worker was being built");
                false
            }
            Err(err) => {
                log_error!(err, pool = %inner.config.name, "add_worker failed");
                false
            }
        }
    }

    /// Retire one running worker and lower the maintained count by one.
    ///
    /// Returns `None` if the pool has no workers, `Some(false)` if none of
    /// them is still running, and `Some(true)` once a worker was told to stop.
    /// A soft removal lets the worker finish its current item; a hard one
    /// interrupts it and forces a flush.
    pub fn remove_worker(&self, soft: bool) -> Option<bool> {
        let inner = &self.inner;
        let workers = inner.workers();
        if workers.is_empty() {
            return None;
        }

        let Some(handle) = workers.iter().find(|handle| handle.is_running()) else {
            return Some(false);
        };

        if soft {
            handle.request_stop();
        } else {
            handle.cancel();
        }
        let _ = inner
            .target
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |target| Some(target.saturating_sub(1)));

        log_pool!(inner.config.name, "worker_removed", worker = %handle.name(), soft);
        Some(true)
    }

    /// Count alive/dead workers and set/cleared run flags.
    pub fn health_snapshot(&self) -> HealthSnapshot {
        self.inner.health_snapshot()
    }

    /// Clear every worker's run flag and stop accepting items. Does not wait.
    pub fn soft_shutdown(&self) {
        self.inner.soft_shutdown();
        log_pool!(self.inner.config.name, "soft_shutdown");
    }

    /// Interrupt every worker and stop the supervisor without waiting.
    ///
    /// Returns the number of items left in the queue, which will not be processed.
    pub fn hard_shutdown(&self) -> usize {
        self.inner.hard_shutdown()
    }

    /// Graceful shutdown.
    ///
    /// 1. Stop accepting items
    /// 2. Wait for the queue to drain while workers are alive, at most `drain_timeout`
    /// 3. Clear every run flag and poll health until no worker is alive
    /// 4. Stop the supervisor, join every worker and return them to the factory
    pub async fn shutdown(&self) -> ShutdownReport {
        let inner = &self.inner;
        let span = pool_span!(inner.config.name, "shutdown");

        async move {
            inner.begin_shutdown();
            let poll = inner.config.shutdown_poll_interval;

            let deadline = Instant::now() + inner.config.drain_timeout;
            while !inner.queue.is_empty() && inner.health_snapshot().alive > 0 {
                if Instant::now() >= deadline {
                    warn!(pool = %inner.config.name, remaining = inner.queue.len(), "drain timeout elapsed");
                    break;
                }
                tokio::time::sleep(poll).await;
            }

            inner.soft_shutdown();
            loop {
                let snapshot = inner.health_snapshot();
                if snapshot.alive == 0 {
                    break;
                }
                debug!(pool = %inner.config.name, %snapshot, "waiting for workers to stop");
                tokio::time::sleep(poll).await;
            }

            inner.stop_supervisor();
            let handles = {
                let mut workers = inner.workers();
                inner.status.store(PoolStatus::Shutdown as u8, Ordering::Release);
                std::mem::take(&mut *workers)
            };
            let (workers_joined, failures) = inner.retire(handles).await;
            let report = ShutdownReport {
                workers_joined,
                failures,
                abandoned_items: inner.queue.len(),
            };

            log_pool!(
                inner.config.name,
                "shutdown_complete",
                workers = report.workers_joined,
                failures = report.failures.len(),
                abandoned = report.abandoned_items
            );
            report
        }
        .instrument(span)
        .await
    }

    /// Join and drop workers whose task has ended, returning the abnormal exits.
    pub async fn prune_dead(&self) -> Vec<WorkerFailure> {
        self.inner.prune_dead().await
    }

    pub fn worker_infos(&self) -> Vec<WorkerInfo> {
        self.inner.workers().iter().map(WorkerHandle::info).collect()
    }

    pub fn worker_count(&self) -> usize {
        self.inner.workers().len()
    }

    /// Count the supervisor maintains when `maintain_count` is set.
    pub fn target_workers(&self) -> usize {
        self.inner.target.load(Ordering::Acquire)
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.inner.queue.capacity()
    }

    pub fn status(&self) -> PoolStatus {
        self.inner.status()
    }

    /// Whether the pool is started and not shutting down.
    pub fn is_active(&self) -> bool {
        self.inner.status() == PoolStatus::Running
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

impl<T: Send + 'static> fmt::Debug for ElasticPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElasticPool")
            .field("name", &self.inner.config.name)
            .field("status", &self.inner.status())
            .field("workers", &self.inner.workers().len())
            .field("queue_len", &self.inner.queue.len())
            .finish()
    }
}

impl<T: Send + 'static> Drop for ElasticPool<T> {
    fn drop(&mut self) {
        if self.inner.status() != PoolStatus::Shutdown {
            self.inner.hard_shutdown();
        }
    }
}

/// Builder for [`ElasticPool`].
pub struct ElasticPoolBuilder<T: Send + 'static> {
    config: PoolConfig,
    factory: Option<Arc<dyn WorkerFactory<T>>>,
    reporter: Option<Arc<dyn HealthReporter>>,
    runtime: Option<Handle>,
}

impl<T: Send + 'static> ElasticPoolBuilder<T> {
    pub fn factory(mut self, factory: impl WorkerFactory<T>) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Use a [`QueueProcessorFactory`] that builds a fresh processor with
    /// `make` for every worker, configured from the pool config's `worker` section.
    pub fn processor<P, F>(self, make: F) -> Self
    where
        P: QueueProcessor<T>,
        F: Fn() -> P + Send + Sync + 'static,
    {
        let factory = QueueProcessorFactory::new(self.config.worker.clone(), make);
        self.factory(factory)
    }

    /// Receiver of the supervisor's health snapshots. Defaults to [`TracingReporter`].
    pub fn reporter(mut self, reporter: impl HealthReporter) -> Self {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    /// Runtime to spawn workers on. Defaults to the runtime `build` is called from.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// # Errors
    /// [`PoolError::Config`] for an invalid config or when no runtime is available.
    pub fn build(self) -> Result<ElasticPool<T>, PoolError> {
        self.config.validate()?;
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| ConfigError::NoRuntime)?,
        };

        let inner = PoolInner {
            queue: WorkQueue::new(self.config.queue_capacity),
            factory: self.factory,
            reporter: self.reporter.unwrap_or_else(|| Arc::new(TracingReporter)),
            runtime,
            workers: Mutex::new(Vec::new()),
            status: AtomicU8::new(PoolStatus::Created as u8),
            target: AtomicUsize::new(0),
            next_index: AtomicUsize::new(0),
            supervisor: Mutex::new(None),
            config: self.config,
        };

        Ok(ElasticPool {
            inner: Arc::new(inner),
        })
    }
}
