// Workhorse Worker Pool Framework Implementation
//
// This crate provides the runtime for the workhorse API: a Tokio-driven worker
// runner, queue workers, elastic pools sharing one bounded input queue, and a
// per-second rate limiter for downstream calls.

pub mod config;
pub mod error;
pub mod logging;
pub mod pool;
pub mod rate;
pub mod worker;

// Re-export commonly used types
pub use config::{PoolConfig, QueueWorkerConfig, RateLimiterConfig};
pub use error::{ConfigError, PoolError, ShutdownReport, WorkerFailure};
pub use pool::{ElasticPool, ElasticPoolBuilder, PoolStatus, QueueProcessorFactory, TracingReporter, WorkerFactory};
pub use rate::{Clock, LatencyStats, ManualClock, RateLimiter, SystemClock};
pub use worker::{spawn_worker, QueueWorker, WorkerExit, WorkerHandle, WorkerInfo};
pub use workhorse_api::{
    BoxedWorker, CallError, CallResult, FactoryError, HealthReporter, HealthSnapshot, QueueProcessor,
    RateLimitedTask, RetryAfter, Worker, WorkerContext, WorkerError, WorkerResult, WorkerState,
};
