//! # Rate Limiting Module
//!
//! A per-second admission gate for downstream operations.
//!
//! ## Key Concepts
//! - Quota: the maximum number of calls admitted in one wall-clock second
//! - Window: a ring of sixty one-second slots indexed by second-of-minute, each
//!   holding an admission counter and latency statistics
//! - Fail fast: admission never waits; an exhausted second rejects with
//!   `CallError::RateExceeded` and a hint for when to retry
//!
//! ## Thread Safety
//! - Admission is a single compare-and-swap on a packed (second, count) word
//! - Latency statistics sit behind a per-slot mutex held only while recording

mod clock;
mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use window::{LatencyStats, MAX_QUOTA_PER_SECOND, WINDOW_SLOTS};

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, trace};
use workhorse_api::{CallError, CallResult, RateLimitedTask, RetryAfter};

use crate::config::RateLimiterConfig;
use crate::error::ConfigError;
use window::{Admission, Window};

/// Per-second admission gate wrapping a [`RateLimitedTask`].
///
/// `C` is the per-call configuration type of the wrapped task.
///
/// # Example
///
/// ```rust,ignore
/// let limiter = RateLimiter::new(sink, RateLimiterConfig::per_second(3))?;
/// match limiter.attempt_call(batch, Duration::from_secs(1)).await {
///     Ok(rows) => println!("wrote {rows} rows"),
///     Err(CallError::RateExceeded { retry_after }) => println!("busy, retry after {retry_after}"),
///     Err(e) => return Err(e.into()),
/// }
/// ```
pub struct RateLimiter<T, C> {
    task: T,
    name: String,
    quota: u32,
    enabled: AtomicBool,
    window: Window,
    clock: Arc<dyn Clock>,
    _config: PhantomData<fn(C)>,
}

impl<T, C> RateLimiter<T, C>
where
    T: RateLimitedTask<C>,
    C: Send + 'static,
{
    pub fn new(task: T, config: RateLimiterConfig) -> Result<Self, ConfigError> {
        Self::with_clock(task, config, Arc::new(SystemClock))
    }

    pub fn with_clock(task: T, config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            task,
            name: config.name,
            quota: config.quota_per_second,
            enabled: AtomicBool::new(config.enabled),
            window: Window::new(),
            clock,
            _config: PhantomData,
        })
    }

    /// Admit and run one call of the wrapped task.
    ///
    /// The admission check never blocks. Once admitted, the call's elapsed time
    /// is recorded against the second it was admitted in, and its result or
    /// error is returned unchanged.
    pub async fn attempt_call(&self, config: C, timeout: Duration) -> CallResult<T::Output> {
        if !self.is_enabled() {
            return Err(CallError::Disabled);
        }
        if !self.task.is_available() {
            return Err(CallError::Unavailable);
        }

        let now = self.clock.now();
        let epoch_second = now.as_secs();
        let slot = self.window.slot_for(epoch_second);

        match slot.try_admit(epoch_second, self.quota) {
            Admission::Rejected => {
                let retry_after = self.retry_hint(now);
                trace!(limiter = %self.name, second = epoch_second % 60, %retry_after, "call rejected");
                return Err(CallError::RateExceeded { retry_after });
            }
            Admission::Admitted { position, rolled_over } => {
                if rolled_over {
                    debug!(limiter = %self.name, second = epoch_second % 60, "rate window rolled over");
                }
                trace!(limiter = %self.name, position, quota = self.quota, "call admitted");
            }
        }

        let started = Instant::now();
        let result = self.task.attempt_call(config, timeout).await;
        slot.record(epoch_second, started.elapsed(), result.is_ok());
        result
    }

    fn retry_hint(&self, now: Duration) -> RetryAfter {
        if self.quota == 0 {
            return RetryAfter::Never;
        }
        let into_second = Duration::from_nanos(u64::from(now.subsec_nanos()));
        RetryAfter::After(Duration::from_secs(1).saturating_sub(into_second))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        debug!(limiter = %self.name, enabled, "rate limiter toggled");
    }

    pub fn quota_per_second(&self) -> u32 {
        self.quota
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calls admitted so far in the current second.
    pub fn current_second_admitted(&self) -> u32 {
        let epoch_second = self.clock.now().as_secs();
        self.window.slot_for(epoch_second).admitted_in(epoch_second)
    }

    /// Latency statistics of the current second.
    pub fn current_stats(&self) -> LatencyStats {
        let epoch_second = self.clock.now().as_secs();
        let stats = self.window.slot_for(epoch_second).stats();
        if stats.epoch_second == epoch_second {
            stats
        } else {
            LatencyStats {
                epoch_second,
                ..Default::default()
            }
        }
    }

    /// Latency statistics stored in the slot for `second_of_minute` (0..60).
    /// The slot holds whichever epoch second last used it.
    pub fn stats_for(&self, second_of_minute: usize) -> Option<LatencyStats> {
        self.window.slot_at(second_of_minute).map(|slot| slot.stats())
    }

    pub fn inner(&self) -> &T {
        &self.task
    }
}

impl<T, C> fmt::Debug for RateLimiter<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("quota", &self.quota)
            .field("enabled", &self.enabled.load(Ordering::Relaxed))
            .finish()
    }
}

// Limiters compose: a gated task is itself a rate-limited task.
#[async_trait]
impl<T, C> RateLimitedTask<C> for RateLimiter<T, C>
where
    T: RateLimitedTask<C>,
    C: Send + 'static,
{
    type Output = T::Output;

    fn is_available(&self) -> bool {
        self.is_enabled() && self.task.is_available()
    }

    async fn attempt_call(&self, config: C, timeout: Duration) -> CallResult<T::Output> {
        RateLimiter::attempt_call(self, config, timeout).await
    }
}
