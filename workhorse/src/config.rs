use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::rate::MAX_QUOTA_PER_SECOND;

pub const DEFAULT_QUEUE_CAPACITY: usize = 10000;

// --- Queue Worker Configuration ---

/// Timing of a single queue worker's poll loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueWorkerConfig {
    /// Longest a single poll of the input queue may block.
    #[serde(with = "duration_ms")]
    pub poll_timeout: Duration,

    /// Sleep after a poll that found the queue empty.
    #[serde(with = "duration_ms")]
    pub empty_backoff: Duration,
}

impl Default for QueueWorkerConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(100),
            empty_backoff: Duration::from_millis(10),
        }
    }
}

impl QueueWorkerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("poll_timeout"));
        }
        Ok(())
    }
}

// --- Pool Configuration ---

/// Configuration for an `ElasticPool`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Name used as log prefix and worker name prefix.
    pub name: String,

    /// Capacity of the shared input queue, fixed for the life of the pool.
    pub queue_capacity: usize,

    /// Desired steady-state worker count. `None` keeps the count passed to `start`.
    pub target_workers: Option<usize>,

    /// Whether the supervisor replaces dead workers to hold the target count.
    pub maintain_count: bool,

    /// How often the supervisor samples and reports worker health.
    #[serde(with = "duration_ms")]
    pub report_interval: Duration,

    /// How often a graceful shutdown re-checks for live workers.
    #[serde(with = "duration_ms")]
    pub shutdown_poll_interval: Duration,

    /// Upper bound on waiting for the queue to drain during a graceful shutdown.
    #[serde(with = "duration_ms")]
    pub drain_timeout: Duration,

    /// Settings handed to every queue worker the pool's factory builds.
    pub worker: QueueWorkerConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "pool".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            target_workers: None,
            maintain_count: false,
            report_interval: Duration::from_secs(30),
            shutdown_poll_interval: Duration::from_millis(10),
            drain_timeout: Duration::from_secs(30),
            worker: QueueWorkerConfig::default(),
        }
    }
}

impl PoolConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.report_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("report_interval"));
        }
        if self.shutdown_poll_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("shutdown_poll_interval"));
        }
        self.worker.validate()
    }
}

// --- Rate Limiter Configuration ---

/// Configuration for a per-second `RateLimiter`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    pub name: String,

    /// Maximum calls admitted in any one wall-clock second. Zero rejects everything.
    pub quota_per_second: u32,

    /// A disabled limiter fails every call with `CallError::Disabled`.
    pub enabled: bool,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            name: "rate-limiter".to_string(),
            quota_per_second: 100,
            enabled: true,
        }
    }
}

impl RateLimiterConfig {
    pub fn per_second(quota_per_second: u32) -> Self {
        Self {
            quota_per_second,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quota_per_second > MAX_QUOTA_PER_SECOND {
            return Err(ConfigError::QuotaTooLarge {
                quota: self.quota_per_second,
                max: MAX_QUOTA_PER_SECOND,
            });
        }
        Ok(())
    }
}

/// Serde adapter storing a `Duration` as whole milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_defaults_are_valid() {
        let config = PoolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(!config.maintain_count);
        assert_eq!(config.worker.poll_timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_pool_config_rejects_zero_values() {
        let config = PoolConfig { queue_capacity: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroCapacity)));

        let config = PoolConfig { report_interval: Duration::ZERO, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroDuration("report_interval"))));

        let mut config = PoolConfig::named("  ");
        assert!(matches!(config.validate(), Err(ConfigError::EmptyName)));
        config.name = "ok".into();
        config.worker.poll_timeout = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroDuration("poll_timeout"))));
    }

    #[test]
    fn test_rate_config_quota_bound() {
        assert!(RateLimiterConfig::per_second(0).validate().is_ok());
        assert!(RateLimiterConfig::per_second(MAX_QUOTA_PER_SECOND).validate().is_ok());
        assert!(matches!(
            RateLimiterConfig::per_second(MAX_QUOTA_PER_SECOND + 1).validate(),
            Err(ConfigError::QuotaTooLarge { .. })
        ));
    }

    #[test]
    fn test_pool_config_from_json_with_partial_fields() {
        let config: PoolConfig = serde_json::from_str(
            r#"{"name": "errors", "queue_capacity": 64, "drain_timeout": 1500, "worker": {"empty_backoff": 5}}"#,
        )
        .unwrap();

        assert_eq!(config.name, "errors");
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.drain_timeout, Duration::from_millis(1500));
        assert_eq!(config.worker.empty_backoff, Duration::from_millis(5));
        assert_eq!(config.worker.poll_timeout, Duration::from_millis(100));
        assert_eq!(config.report_interval, Duration::from_secs(30));
    }
}
