// Integration tests for config types in workhorse::config

use std::time::Duration;

use workhorse::config::*;
use workhorse::ConfigError;

#[test]
fn test_pool_config_defaults() {
    let config = PoolConfig::default();

    assert_eq!(config.name, "pool");
    assert_eq!(config.queue_capacity, 10000);
    assert!(config.target_workers.is_none());
    assert!(!config.maintain_count);
    assert_eq!(config.report_interval, Duration::from_secs(30));
    assert_eq!(config.shutdown_poll_interval, Duration::from_millis(10));
    assert_eq!(config.drain_timeout, Duration::from_secs(30));
    assert_eq!(config.worker, QueueWorkerConfig::default());
}

#[test]
fn test_queue_worker_config_defaults() {
    let config = QueueWorkerConfig::default();

    assert_eq!(config.poll_timeout, Duration::from_millis(100));
    assert_eq!(config.empty_backoff, Duration::from_millis(10));
    assert!(config.validate().is_ok());
}

#[test]
fn test_rate_limiter_config_defaults() {
    let config = RateLimiterConfig::default();

    assert_eq!(config.name, "rate-limiter");
    assert_eq!(config.quota_per_second, 100);
    assert!(config.enabled);
    assert_eq!(RateLimiterConfig::per_second(7).quota_per_second, 7);
}

#[test]
fn test_durations_serialize_as_milliseconds() {
    let config = PoolConfig {
        target_workers: Some(4),
        ..PoolConfig::named("telemetry")
    };
    let json = serde_json::to_value(&config).unwrap();

    assert_eq!(json["name"], "telemetry");
    assert_eq!(json["target_workers"], 4);
    assert_eq!(json["report_interval"], 30_000);
    assert_eq!(json["shutdown_poll_interval"], 10);
    assert_eq!(json["worker"]["poll_timeout"], 100);

    let back: PoolConfig = serde_json::from_value(json).unwrap();
    assert_eq!(back, config);
}

#[test]
fn test_rate_limiter_config_from_json() {
    let config: RateLimiterConfig = serde_json::from_str(r#"{"quota_per_second": 0, "enabled": false}"#).unwrap();

    assert_eq!(config.name, "rate-limiter");
    assert_eq!(config.quota_per_second, 0);
    assert!(!config.enabled);
    assert!(config.validate().is_ok());
}

#[test]
fn test_drain_timeout_may_be_zero() {
    // Zero means "do not wait for the queue"; only the polling intervals must be positive.
    let config = PoolConfig {
        drain_timeout: Duration::ZERO,
        ..Default::default()
    };
    assert!(config.validate().is_ok());

    let config = PoolConfig {
        shutdown_poll_interval: Duration::ZERO,
        ..Default::default()
    };
    assert_eq!(config.validate(), Err(ConfigError::ZeroDuration("shutdown_poll_interval")));
}

#[test]
fn test_config_debug_format() {
    let pool_config = PoolConfig::default();
    let rate_config = RateLimiterConfig::default();
    // Basic check to ensure Debug trait doesn't panic
    assert!(format!("{:?}", pool_config).contains("queue_capacity"));
    assert!(format!("{:?}", rate_config).contains("quota_per_second"));
}
