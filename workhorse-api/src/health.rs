use std::fmt;

use serde::{Deserialize, Serialize};

/// Point-in-time worker accounting for a pool.
///
/// `alive`/`dead` count whether each worker's task is still executing;
/// `should_run`/`should_not_run` count the state of each worker's run flag.
/// A worker that has been asked to stop but is still finishing its current
/// item is counted as both `alive` and `should_not_run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub alive: usize,
    pub dead: usize,
    pub should_run: usize,
    pub should_not_run: usize,
}

impl HealthSnapshot {
    /// Number of workers the snapshot was taken over.
    pub fn total(&self) -> usize {
        self.alive + self.dead
    }

    /// Alive workers whose run flag has been cleared.
    pub fn draining(&self) -> usize {
        self.alive.saturating_sub(self.should_run)
    }
}

impl fmt::Display for HealthSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "alive={} dead={} should_run={} should_not_run={}",
            self.alive, self.dead, self.should_run, self.should_not_run
        )
    }
}

/// Consumer of the health snapshots a pool supervisor takes on every tick.
///
/// Implementations export to logs or a metrics system, or layer their own
/// backfill and alerting policy on top of the pool.
pub trait HealthReporter: Send + Sync + 'static {
    fn report(&self, pool: &str, snapshot: &HealthSnapshot);
}

impl<F> HealthReporter for F
where
    F: Fn(&str, &HealthSnapshot) + Send + Sync + 'static,
{
    fn report(&self, pool: &str, snapshot: &HealthSnapshot) {
        (self)(pool, snapshot)
    }
}
