use tracing::{info, warn};
use workhorse_api::{HealthReporter, HealthSnapshot};

/// Default reporter: one `info` event per tick, `warn` when dead workers are
/// still being held by the pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl HealthReporter for TracingReporter {
    fn report(&self, pool: &str, snapshot: &HealthSnapshot) {
        if snapshot.dead > 0 {
            warn!(
                pool = %pool,
                alive = snapshot.alive,
                dead = snapshot.dead,
                should_run = snapshot.should_run,
                should_not_run = snapshot.should_not_run,
                "pool has dead workers"
            );
        } else {
            info!(
                pool = %pool,
                alive = snapshot.alive,
                dead = snapshot.dead,
                should_run = snapshot.should_run,
                should_not_run = snapshot.should_not_run,
                "pool health"
            );
        }
    }
}
