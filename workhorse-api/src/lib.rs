//! # Workhorse API
//!
//! The interface layer of the workhorse worker-pool framework. It defines the
//! vocabulary shared between the runtime crate and the applications that plug
//! their own processing into it.
//!
//! ## Core Components
//!
//! - **Workers**: long-running units of execution with an explicit run flag and
//!   an observable processing [`WorkerState`]
//! - **Worker context**: the control block a worker uses to publish its state
//!   and observe stop/cancel requests
//! - **Queue processors**: per-item handlers driven by a queue worker
//! - **Rate-limited tasks**: downstream operations that can be gated by an
//!   admission limiter
//! - **Health**: the snapshot record produced by a pool supervisor
//!
//! ## Usage Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use workhorse_api::{QueueProcessor, WorkerContext, WorkerResult, WorkerState};
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl QueueProcessor<String> for Printer {
//!     async fn process(&mut self, line: String, ctx: &WorkerContext) -> WorkerResult<()> {
//!         ctx.set_state(WorkerState::Pushing);
//!         println!("{}: {}", ctx.name(), line);
//!         Ok(())
//!     }
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`state`]: the worker state enumeration and its timestamped cell
//! - [`context`]: worker control block
//! - [`worker`]: the `Worker` lifecycle trait
//! - [`queue`]: the `QueueProcessor` trait
//! - [`task`]: the `RateLimitedTask` trait
//! - [`health`]: health snapshots and reporters
//! - [`errors`]: error types
//! - [`types`]: common aliases

pub mod context;
pub mod errors;
pub mod health;
pub mod queue;
pub mod state;
pub mod task;
pub mod types;
pub mod worker;

pub use context::WorkerContext;
pub use errors::{CallError, FactoryError, RetryAfter, WorkerError};
pub use health::{HealthReporter, HealthSnapshot};
pub use queue::QueueProcessor;
pub use state::{StateCell, WorkerState};
pub use task::RateLimitedTask;
pub use types::{BoxedWorker, CallResult, WorkerResult};
pub use worker::Worker;
