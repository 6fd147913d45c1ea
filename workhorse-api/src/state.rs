use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Processing phase of a worker.
///
/// The set is fixed, but no transition graph is enforced: a worker implementation
/// moves between any two states by calling [`crate::WorkerContext::set_state`].
/// The runtime itself only writes `Starting`, `Flushing`, `Stopping`, `Stopped`
/// and `Failing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum WorkerState {
    Starting = 0,
    Stopping = 1,
    Stopped = 2,
    AcquiringResource = 3,
    Waiting = 4,
    Pulling = 5,
    Pushing = 6,
    Batching = 7,
    ExecutingBatch = 8,
    Committing = 9,
    VerifyingCommit = 10,
    Flushing = 11,
    ReportingError = 12,
    Failing = 13,
}

impl WorkerState {
    pub const ALL: [WorkerState; 14] = [
        WorkerState::Starting,
        WorkerState::Stopping,
        WorkerState::Stopped,
        WorkerState::AcquiringResource,
        WorkerState::Waiting,
        WorkerState::Pulling,
        WorkerState::Pushing,
        WorkerState::Batching,
        WorkerState::ExecutingBatch,
        WorkerState::Committing,
        WorkerState::VerifyingCommit,
        WorkerState::Flushing,
        WorkerState::ReportingError,
        WorkerState::Failing,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Starting => "STARTING",
            WorkerState::Stopping => "STOPPING",
            WorkerState::Stopped => "STOPPED",
            WorkerState::AcquiringResource => "ACQUIRING_RESOURCE",
            WorkerState::Waiting => "WAITING",
            WorkerState::Pulling => "PULLING",
            WorkerState::Pushing => "PUSHING",
            WorkerState::Batching => "BATCHING",
            WorkerState::ExecutingBatch => "EXECUTING_BATCH",
            WorkerState::Committing => "COMMITTING",
            WorkerState::VerifyingCommit => "VERIFYING_COMMIT",
            WorkerState::Flushing => "FLUSHING",
            WorkerState::ReportingError => "REPORTING_ERROR",
            WorkerState::Failing => "FAILING",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A worker state paired with the monotonic time of its last change.
///
/// Readers on other threads may observe the state and the timestamp from two
/// neighbouring transitions; both values are individually consistent.
pub struct StateCell {
    state: AtomicU8,
    /// Reference point for `changed_at_nanos`
    base: Instant,
    changed_at_nanos: AtomicU64,
}

impl StateCell {
    pub fn new(initial: WorkerState) -> Self {
        Self {
            state: AtomicU8::new(initial as u8),
            base: Instant::now(),
            changed_at_nanos: AtomicU64::new(0),
        }
    }

    /// Store a new state and stamp the change time. Setting the current state
    /// again still counts as a transition.
    pub fn set(&self, state: WorkerState) -> WorkerState {
        let nanos = u64::try_from(self.base.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.changed_at_nanos.store(nanos, Ordering::Release);
        let previous = self.state.swap(state as u8, Ordering::AcqRel);
        WorkerState::from_u8(previous).unwrap_or(WorkerState::Failing)
    }

    pub fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire)).unwrap_or(WorkerState::Failing)
    }

    pub fn last_change(&self) -> Instant {
        self.base + Duration::from_nanos(self.changed_at_nanos.load(Ordering::Acquire))
    }

    pub fn time_in_state(&self) -> Duration {
        self.last_change().elapsed()
    }
}

impl fmt::Debug for StateCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateCell")
            .field("state", &self.get())
            .field("time_in_state", &self.time_in_state())
            .finish()
    }
}
