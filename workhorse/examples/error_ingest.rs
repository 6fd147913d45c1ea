use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use workhorse::logging;
use workhorse::{
    CallResult, ElasticPool, PoolConfig, QueueProcessor, RateLimitedTask, RateLimiter, RateLimiterConfig,
    WorkerContext, WorkerResult, WorkerState,
};

// An error event as a log shipper would hand it over.
#[derive(Debug, Clone, Serialize)]
struct ErrorEvent {
    service: &'static str,
    message: String,
}

// Pretend database: prints the row as JSON.
#[derive(Default)]
struct ErrorTable {
    rows: AtomicUsize,
}

#[async_trait]
impl RateLimitedTask<ErrorEvent> for ErrorTable {
    type Output = usize;

    async fn attempt_call(&self, event: ErrorEvent, _timeout: Duration) -> CallResult<usize> {
        let row = serde_json::to_string(&event).map_err(anyhow::Error::from)?;
        println!("INSERT {}", row);
        Ok(self.rows.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[derive(Clone)]
struct ErrorWriter {
    table: Arc<RateLimiter<ErrorTable, ErrorEvent>>,
}

#[async_trait]
impl QueueProcessor<ErrorEvent> for ErrorWriter {
    async fn process(&mut self, event: ErrorEvent, ctx: &WorkerContext) -> WorkerResult<()> {
        ctx.set_state(WorkerState::Pushing);
        match self.table.attempt_call(event, Duration::from_secs(1)).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_capacity() => {
                tracing::warn!(worker = %ctx.name(), error = %err, "dropping event");
                Ok(())
            }
            Err(err) => Err(anyhow::Error::new(err).into()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_development();

    let table = Arc::new(RateLimiter::new(
        ErrorTable::default(),
        RateLimiterConfig {
            name: "error-table".to_string(),
            ..RateLimiterConfig::per_second(20)
        },
    )?);
    let writer = ErrorWriter { table: table.clone() };

    let mut config = PoolConfig::named("errors");
    config.queue_capacity = 256;
    config.maintain_count = true;
    config.report_interval = Duration::from_millis(250);

    let pool = ElasticPool::<ErrorEvent>::builder(config)
        .processor(move || writer.clone())
        .build()?;
    pool.start(2)?;

    for i in 0..50 {
        let event = ErrorEvent {
            service: if i % 2 == 0 { "billing" } else { "search" },
            message: format!("request {} failed", i),
        };
        if !pool.offer(event, Duration::from_millis(100)).await? {
            tracing::warn!("queue full, event dropped");
        }
    }

    pool.add_worker();
    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("health: {}", pool.health_snapshot());

    let report = pool.shutdown().await.into_result()?;
    println!(
        "rows written: {}, workers joined: {}, stats: {}",
        table.inner().rows.load(Ordering::SeqCst),
        report.workers_joined,
        table.current_stats()
    );
    Ok(())
}
