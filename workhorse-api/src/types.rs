use crate::errors::{CallError, WorkerError};
use crate::worker::Worker;

// Type aliases for common types
pub type WorkerResult<T> = Result<T, WorkerError>;
pub type CallResult<T> = Result<T, CallError>;
pub type BoxedWorker = Box<dyn Worker>;
