use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use uuid::Uuid;

use crate::state::{StateCell, WorkerState};

/// Control block of a single worker.
///
/// A `WorkerContext` is shared between the task driving a worker and the handles
/// held by its owner. The worker writes its state through it; the owner flips
/// the run flag or raises the cancel signal.
///
/// # Thread Safety
/// - The run flag and state are atomics
/// - The cancel signal is a `watch` channel, so a cancel raised before anyone
///   waits on it is still observed
#[derive(Clone)]
pub struct WorkerContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    id: Uuid,
    name: String,
    running: AtomicBool,
    state: StateCell,
    cancel_tx: watch::Sender<bool>,
}

impl WorkerContext {
    /// Create a context for a new, not yet running worker.
    ///
    /// Without a name the worker is called `worker-<first 8 hex digits of its id>`.
    pub fn new(name: Option<String>) -> Self {
        let id = Uuid::new_v4();
        let name = name.unwrap_or_else(|| {
            let simple = id.simple().to_string();
            format!("worker-{}", &simple[..8])
        });
        let (cancel_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(ContextInner {
                id,
                name,
                running: AtomicBool::new(false),
                state: StateCell::new(WorkerState::Stopped),
                cancel_tx,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The cooperative "keep looping" flag.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Set the run flag, failing if it was already set.
    pub fn try_mark_running(&self) -> bool {
        self.inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Clear the run flag. Non-blocking; the loop notices at its next iteration.
    pub fn request_stop(&self) {
        self.inner.running.store(false, Ordering::Release);
    }

    /// Clear the run flag and interrupt whatever the worker is waiting on.
    pub fn cancel(&self) {
        self.request_stop();
        self.inner.cancel_tx.send_replace(true);
    }

    /// Lower a previously raised cancel signal, so a stopped worker can be
    /// started again with the same context.
    pub fn clear_cancel(&self) {
        self.inner.cancel_tx.send_replace(false);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancel_tx.borrow()
    }

    /// Resolves once [`WorkerContext::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.cancel_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    pub fn set_state(&self, state: WorkerState) {
        let previous = self.inner.state.set(state);
        if previous != state {
            tracing::trace!(worker = %self.inner.name, from = %previous, to = %state, "state change");
        }
    }

    pub fn state(&self) -> WorkerState {
        self.inner.state.get()
    }

    pub fn last_state_change(&self) -> Instant {
        self.inner.state.last_change()
    }

    pub fn time_in_state(&self) -> Duration {
        self.inner.state.time_in_state()
    }
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("running", &self.is_running())
            .field("state", &self.state())
            .finish()
    }
}
