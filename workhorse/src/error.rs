use std::fmt;

use thiserror::Error;
use uuid::Uuid;
use workhorse_api::FactoryError;

use crate::worker::WorkerExit;

/// Errors found while validating a configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Name must not be empty")]
    EmptyName,
    #[error("Queue capacity must be greater than zero")]
    ZeroCapacity,
    #[error("Duration `{0}` must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("Quota {quota}/s exceeds the supported maximum of {max}/s")]
    QuotaTooLarge { quota: u32, max: u32 },
    #[error("Workers were requested but no worker factory is configured")]
    MissingFactory,
    #[error("No Tokio runtime available to spawn workers on")]
    NoRuntime,
}

/// Errors related to pool operations.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Pool is shutting down")]
    ShuttingDown,
    #[error("Pool is already started")]
    AlreadyStarted,
    #[error("Pool failed to start: {0}")]
    StartFailed(String),
    #[error("Worker factory failed: {0}")]
    Factory(#[from] FactoryError),
    #[error("Input queue disconnected")]
    Disconnected,
    #[error("{} worker(s) ended abnormally", .0.len())]
    WorkerFailures(Vec<WorkerFailure>),
    #[error("Internal pool error: {0}")]
    Other(#[from] anyhow::Error),
}

/// A worker that ended for a reason other than being asked to stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFailure {
    pub id: Uuid,
    pub name: String,
    pub exit: WorkerExit,
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name, self.id, self.exit)
    }
}

/// Aggregated outcome of a pool shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers joined during the shutdown.
    pub workers_joined: usize,
    /// Workers whose exit was a failure, panic or abort.
    pub failures: Vec<WorkerFailure>,
    /// Items still sitting in the queue when the pool stopped.
    pub abandoned_items: usize,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.abandoned_items == 0
    }

    /// Turn worker failures into an error, for callers that treat any
    /// abnormal exit as fatal.
    pub fn into_result(self) -> Result<Self, PoolError> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(PoolError::WorkerFailures(self.failures))
        }
    }
}
