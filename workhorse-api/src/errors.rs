//! # Worker and Task Error Types
//!
//! This module defines the error types shared by workers, worker factories and
//! rate-limited tasks.
//!
//! ## Error Classification
//!
//! - `WorkerError`: failures inside a worker's loop. Every variant is fatal to
//!   the single worker that raised it; the owning pool observes the death
//!   through its health snapshot.
//! - `CallError`: failures of a gated downstream call. These always reach the
//!   immediate caller, and capacity failures carry a [`RetryAfter`] hint.
//! - `FactoryError`: a worker factory could not produce a worker.
//!
//! ## Usage Example
//!
//! ```rust
//! use workhorse_api::errors::{CallError, RetryAfter};
//!
//! fn should_retry(error: &CallError) -> bool {
//!     match error {
//!         CallError::RateExceeded { retry_after } => *retry_after != RetryAfter::Never,
//!         CallError::Unavailable | CallError::Timeout(_) => true,
//!         _ => false,
//!     }
//! }
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised inside a worker's lifecycle.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// `start` was called on a worker whose run flag is already set.
    #[error("Worker is already running")]
    AlreadyRunning,

    /// The worker does not implement an optional capability such as `flush`.
    #[error("Operation not supported by this worker")]
    Unsupported,

    /// The worker was cancelled while waiting.
    #[error("Worker was cancelled")]
    Cancelled,

    /// An out-of-resource condition (memory, handles, connections).
    ///
    /// # Parameters
    /// * String - Description of the exhausted resource
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Every producer handle of the input queue has been dropped.
    #[error("Input queue disconnected")]
    QueueDisconnected,

    /// Processing an item failed.
    ///
    /// # Parameters
    /// * String - Detailed error message explaining the failure
    #[error("Processing failed: {0}")]
    Processing(String),

    /// Catch-all for application errors, preserving the source chain.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors raised by a worker factory.
#[derive(Error, Debug, Clone)]
pub enum FactoryError {
    #[error("Failed to create worker: {0}")]
    CreationFailed(String),
}

/// Hint telling a rejected caller when a retry can succeed.
///
/// Legacy sinks encode the hint as milliseconds where `-1` means never and `0`
/// means unknown; [`RetryAfter::as_millis_hint`] and
/// [`RetryAfter::from_millis_hint`] convert to and from that form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryAfter {
    /// Retrying will never succeed (for example a zero quota).
    Never,
    /// No estimate is available.
    Unknown,
    /// Retrying after this delay is expected to succeed.
    After(Duration),
}

impl RetryAfter {
    pub fn as_millis_hint(&self) -> i64 {
        match self {
            RetryAfter::Never => -1,
            RetryAfter::Unknown => 0,
            // A sub-millisecond wait still has to be distinguishable from "unknown".
            RetryAfter::After(delay) => i64::try_from(delay.as_millis()).unwrap_or(i64::MAX).max(1),
        }
    }

    pub fn from_millis_hint(millis: i64) -> Self {
        match millis {
            m if m < 0 => RetryAfter::Never,
            0 => RetryAfter::Unknown,
            m => RetryAfter::After(Duration::from_millis(m as u64)),
        }
    }
}

impl fmt::Display for RetryAfter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryAfter::Never => write!(f, "never"),
            RetryAfter::Unknown => write!(f, "unknown"),
            RetryAfter::After(delay) => write!(f, "{:?}", delay),
        }
    }
}

/// Errors returned by a rate-limited call.
#[derive(Error, Debug)]
pub enum CallError {
    /// The per-second quota is exhausted.
    #[error("Rate exceeded, retry after {retry_after}")]
    RateExceeded { retry_after: RetryAfter },

    /// The downstream resource reports itself unavailable.
    #[error("Task is unavailable")]
    Unavailable,

    /// The gate has been switched off.
    #[error("Task is disabled")]
    Disabled,

    /// The call was cancelled before it completed.
    #[error("Call was cancelled")]
    Cancelled,

    /// The downstream operation did not finish within its timeout.
    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    /// The downstream operation itself failed.
    #[error("Call failed: {0}")]
    Failed(#[from] anyhow::Error),
}

impl CallError {
    /// Whether this error is a capacity rejection rather than a failure of the
    /// downstream operation.
    pub fn is_capacity(&self) -> bool {
        matches!(self, CallError::RateExceeded { .. })
    }

    pub fn retry_after(&self) -> Option<RetryAfter> {
        match self {
            CallError::RateExceeded { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
