// Integration tests for workhorse::rate, alone and behind a pool


use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use test_helpers::fast_config;
use workhorse::{
    CallError, CallResult, ElasticPool, ManualClock, QueueProcessor, RateLimitedTask, RateLimiter, RateLimiterConfig,
    RetryAfter, WorkerContext, WorkerResult, WorkerState,
};

/// Stand-in for a database sink: counts rows written.
#[derive(Default)]
struct RowSink {
    written: AtomicUsize,
}

#[async_trait]
impl RateLimitedTask<u64> for RowSink {
    type Output = usize;

    async fn attempt_call(&self, _row: u64, _timeout: Duration) -> CallResult<usize> {
        Ok(self.written.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

fn limited_sink(quota: u32, clock: &ManualClock) -> Arc<RateLimiter<RowSink, u64>> {
    let config = RateLimiterConfig {
        name: "row-sink".to_string(),
        ..RateLimiterConfig::per_second(quota)
    };
    Arc::new(RateLimiter::with_clock(RowSink::default(), config, Arc::new(clock.clone())).unwrap())
}

#[tokio::test]
async fn test_quota_scenario_three_of_five() {
    let clock = ManualClock::new(Duration::from_secs(1_700_000_000));
    let limiter = limited_sink(3, &clock);

    let mut admitted = 0;
    let mut rejected = 0;
    for row in 0..5 {
        match limiter.attempt_call(row, Duration::from_secs(1)).await {
            Ok(_) => admitted += 1,
            Err(CallError::RateExceeded { retry_after }) => {
                assert_eq!(retry_after, RetryAfter::After(Duration::from_secs(1)));
                rejected += 1;
            }
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!((admitted, rejected), (3, 2));
    assert_eq!(limiter.current_second_admitted(), 3);
    assert_eq!(limiter.current_stats().calls, 3);
}

#[tokio::test]
async fn test_rollover_restarts_count() {
    let clock = ManualClock::new(Duration::from_secs(1_700_000_000));
    let limiter = limited_sink(2, &clock);

    for row in 0..2 {
        limiter.attempt_call(row, Duration::from_secs(1)).await.unwrap();
    }
    assert!(limiter.attempt_call(2, Duration::from_secs(1)).await.is_err());

    clock.advance(Duration::from_secs(1));
    assert_eq!(limiter.current_second_admitted(), 0);
    assert!(limiter.attempt_call(3, Duration::from_secs(1)).await.is_ok());
    assert_eq!(limiter.current_second_admitted(), 1);

    // A full minute later the same slot is reused from zero.
    clock.advance(Duration::from_secs(59));
    assert_eq!(limiter.current_second_admitted(), 0);
    assert!(limiter.attempt_call(4, Duration::from_secs(1)).await.is_ok());
    assert!(limiter.attempt_call(5, Duration::from_secs(1)).await.is_ok());
    assert!(limiter.attempt_call(6, Duration::from_secs(1)).await.is_err());
}

/// Queue processor writing every item through a shared limiter. Rejections
/// are counted and the item is dropped; they do not stop the worker.
#[derive(Clone)]
struct LimitedWriter {
    sink: Arc<RateLimiter<RowSink, u64>>,
    rejected: Arc<AtomicUsize>,
}

#[async_trait]
impl QueueProcessor<u64> for LimitedWriter {
    async fn process(&mut self, row: u64, ctx: &WorkerContext) -> WorkerResult<()> {
        ctx.set_state(WorkerState::Pushing);
        match self.sink.attempt_call(row, Duration::from_millis(100)).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_capacity() => {
                self.rejected.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Err(err) => Err(anyhow::Error::new(err).into()),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_workers_share_one_quota() {
    let clock = ManualClock::new(Duration::from_secs(1_700_000_000));
    let writer = LimitedWriter {
        sink: limited_sink(10, &clock),
        rejected: Arc::new(AtomicUsize::new(0)),
    };

    let pool = {
        let writer = writer.clone();
        ElasticPool::<u64>::builder(fast_config("limited"))
            .processor(move || writer.clone())
            .build()
            .unwrap()
    };
    pool.start(3).unwrap();

    for row in 0..30 {
        assert!(pool.offer(row, Duration::from_millis(100)).await.unwrap());
    }
    let report = pool.shutdown().await;

    assert!(report.is_clean());
    assert_eq!(writer.sink.inner().written.load(Ordering::SeqCst), 10);
    assert_eq!(writer.rejected.load(Ordering::SeqCst), 20);
}
