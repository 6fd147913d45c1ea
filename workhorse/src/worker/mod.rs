//! # Worker runner
//!
//! Drives a [`Worker`] on a Tokio task and hands back a [`WorkerHandle`] for
//! observing and stopping it.
//!
//! ## Core Algorithm
//! 1. Set the run flag (refusing a context that is already running)
//! 2. Run `on_start`
//! 3. Loop `step` while the run flag is set, racing each step against the
//!    context's cancel signal
//! 4. On cancellation, force a `flush` of whatever the worker buffered
//! 5. Run `shutdown_hook` exactly once, then clear the flag and settle in `Stopped`
//!
//! Errors and panics escaping `on_start`, `step` or `flush` end the loop; they
//! are reported through [`WorkerExit`] and never propagate out of the task.

pub mod queue;

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;
use workhorse_api::{BoxedWorker, Worker, WorkerContext, WorkerError, WorkerResult, WorkerState};

use crate::{log_error, log_lifecycle, worker_span};

pub use queue::QueueWorker;

/// How a worker's task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// The run flag was cleared and the loop ran out.
    Completed,
    /// The cancel signal interrupted the loop.
    Cancelled,
    /// `step` returned an error.
    Failed(String),
    /// `on_start`, `step` or the task itself panicked.
    Panicked(String),
    /// `on_start` returned an error; the loop never ran.
    StartFailed(String),
    /// The task was aborted before it could report.
    Aborted,
}

impl WorkerExit {
    /// Whether the worker ended for a reason other than being asked to stop.
    pub fn is_failure(&self) -> bool {
        !matches!(self, WorkerExit::Completed | WorkerExit::Cancelled)
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerExit::Completed => write!(f, "completed"),
            WorkerExit::Cancelled => write!(f, "cancelled"),
            WorkerExit::Failed(reason) => write!(f, "failed: {}", reason),
            WorkerExit::Panicked(reason) => write!(f, "panicked: {}", reason),
            WorkerExit::StartFailed(reason) => write!(f, "start failed: {}", reason),
            WorkerExit::Aborted => write!(f, "aborted"),
        }
    }
}

/// Start `worker` on `runtime`, controlled through `ctx`.
///
/// # Errors
/// [`WorkerError::AlreadyRunning`] if `ctx` already drives a running worker.
pub fn spawn_worker<W: Worker>(
    worker: W,
    ctx: WorkerContext,
    runtime: &Handle,
) -> WorkerResult<WorkerHandle<W>> {
    if !ctx.try_mark_running() {
        return Err(WorkerError::AlreadyRunning);
    }
    ctx.clear_cancel();
    ctx.set_state(WorkerState::Starting);

    let task = runtime.spawn(run_loop(worker, ctx.clone()));
    Ok(WorkerHandle { ctx, task })
}

async fn run_loop<W: Worker>(mut worker: W, ctx: WorkerContext) -> (W, WorkerExit) {
    let span = worker_span!(ctx.name(), ctx.id());

    async move {
        log_lifecycle!(ctx.name(), "starting");

        let exit = match AssertUnwindSafe(worker.on_start(&ctx)).catch_unwind().await {
            Ok(Ok(())) => {
                log_lifecycle!(ctx.name(), "started");
                drive(&mut worker, &ctx).await
            }
            Ok(Err(err)) => {
                log_error!(err, worker = %ctx.name(), "worker setup failed");
                WorkerExit::StartFailed(err.to_string())
            }
            Err(panic) => WorkerExit::Panicked(panic_message(panic.as_ref())),
        };

        if ctx.is_cancelled() {
            forced_flush(&mut worker, &ctx).await;
        }

        ctx.set_state(WorkerState::Stopping);
        if let Err(panic) = AssertUnwindSafe(worker.shutdown_hook(&ctx)).catch_unwind().await {
            warn!(worker = %ctx.name(), panic = %panic_message(panic.as_ref()), "shutdown hook panicked");
        }
        ctx.request_stop();
        ctx.set_state(WorkerState::Stopped);

        log_lifecycle!(ctx.name(), "stopped", exit = %exit);
        (worker, exit)
    }
    .instrument(span)
    .await
}

async fn drive<W: Worker>(worker: &mut W, ctx: &WorkerContext) -> WorkerExit {
    while ctx.is_running() {
        let step = AssertUnwindSafe(worker.step(ctx)).catch_unwind();

        tokio::select! {
            biased;

            _ = ctx.cancelled() => return WorkerExit::Cancelled,
            result = step => match result {
                Ok(Ok(())) => {}
                Ok(Err(WorkerError::Cancelled)) => return WorkerExit::Cancelled,
                Ok(Err(err)) => {
                    log_error!(err, worker = %ctx.name(), state = %ctx.state(), "step failed, stopping worker");
                    return WorkerExit::Failed(err.to_string());
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    log_error!(message, worker = %ctx.name(), state = %ctx.state(), "step panicked, stopping worker");
                    return WorkerExit::Panicked(message);
                }
            },
        }
    }

    if ctx.is_cancelled() {
        WorkerExit::Cancelled
    } else {
        WorkerExit::Completed
    }
}

async fn forced_flush<W: Worker>(worker: &mut W, ctx: &WorkerContext) {
    ctx.set_state(WorkerState::Flushing);
    match AssertUnwindSafe(worker.flush(ctx)).catch_unwind().await {
        Ok(Ok(flushed)) => debug!(worker = %ctx.name(), flushed, "flushed on cancel"),
        Ok(Err(WorkerError::Unsupported)) => debug!(worker = %ctx.name(), "worker has nothing to flush"),
        Ok(Err(err)) => warn!(worker = %ctx.name(), error = %err, "flush on cancel failed"),
        Err(panic) => warn!(worker = %ctx.name(), panic = %panic_message(panic.as_ref()), "flush on cancel panicked"),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Owner's side of a running worker.
pub struct WorkerHandle<W = BoxedWorker> {
    ctx: WorkerContext,
    task: JoinHandle<(W, WorkerExit)>,
}

impl<W> WorkerHandle<W> {
    pub fn id(&self) -> Uuid {
        self.ctx.id()
    }

    pub fn name(&self) -> &str {
        self.ctx.name()
    }

    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    pub fn state(&self) -> WorkerState {
        self.ctx.state()
    }

    pub fn last_state_change(&self) -> Instant {
        self.ctx.last_state_change()
    }

    /// The run flag: whether the worker is still supposed to loop.
    pub fn is_running(&self) -> bool {
        self.ctx.is_running()
    }

    /// Whether the worker's task has not finished yet.
    pub fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cooperative stop, observed before the next `step`.
    pub fn request_stop(&self) {
        self.ctx.request_stop();
    }

    /// Stop and interrupt the current `step`, forcing a flush.
    pub fn cancel(&self) {
        self.ctx.cancel();
    }

    pub fn info(&self) -> WorkerInfo {
        WorkerInfo {
            id: self.ctx.id(),
            name: self.ctx.name().to_string(),
            state: self.ctx.state(),
            time_in_state: self.ctx.time_in_state(),
            running: self.is_running(),
            alive: self.is_alive(),
        }
    }

    /// Wait for the task to end, returning the worker (unless the task was
    /// aborted or died) and how it exited.
    pub async fn join(self) -> (Option<W>, WorkerExit) {
        match self.task.await {
            Ok((worker, exit)) => (Some(worker), exit),
            Err(err) if err.is_cancelled() => (None, WorkerExit::Aborted),
            Err(err) => {
                let message = match err.try_into_panic() {
                    Ok(panic) => panic_message(panic.as_ref()),
                    Err(err) => err.to_string(),
                };
                (None, WorkerExit::Panicked(message))
            }
        }
    }
}

impl<W> fmt::Debug for WorkerHandle<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.ctx.id())
            .field("name", &self.ctx.name())
            .field("state", &self.ctx.state())
            .field("running", &self.is_running())
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Point-in-time view of one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerInfo {
    pub id: Uuid,
    pub name: String,
    pub state: WorkerState,
    pub time_in_state: Duration,
    pub running: bool,
    pub alive: bool,
}

impl WorkerInfo {
    /// A running worker that has sat in one state for longer than `threshold`.
    pub fn is_stalled(&self, threshold: Duration) -> bool {
        self.running && self.alive && self.time_in_state > threshold
    }
}
