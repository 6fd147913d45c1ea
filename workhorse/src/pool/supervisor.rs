use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use super::{PoolInner, PoolStatus};
use crate::log_pool;

/// Spawn the periodic health loop of a pool.
///
/// The loop holds only a weak reference, so it ends on its own once the pool
/// is gone, and on the first tick after the pool stops running.
pub(super) fn spawn<T: Send + 'static>(pool: &Arc<PoolInner<T>>) -> JoinHandle<()> {
    let weak = Arc::downgrade(pool);
    let period = pool.config.report_interval;

    pool.runtime.spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !tick(&weak).await {
                break;
            }
        }
    })
}

async fn tick<T: Send + 'static>(weak: &Weak<PoolInner<T>>) -> bool {
    let Some(pool) = weak.upgrade() else {
        return false;
    };
    if pool.status() != PoolStatus::Running {
        debug!(pool = %pool.config.name, "supervisor exiting");
        return false;
    }

    let snapshot = pool.health_snapshot();
    pool.reporter.report(&pool.config.name, &snapshot);

    if pool.config.maintain_count {
        let failures = pool.prune_dead().await;
        // Shutdown may have started while the dead workers were being joined.
        if pool.status() != PoolStatus::Running {
            return false;
        }
        let added = pool.top_up();
        if added > 0 || !failures.is_empty() {
            log_pool!(pool.config.name, "backfilled", added, replaced_failures = failures.len());
        }
    }

    true
}
