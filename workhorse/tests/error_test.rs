// Integration tests for error types in workhorse::error and workhorse_api::errors

use std::time::Duration;

use anyhow::anyhow;
use uuid::Uuid;
use workhorse::{
    CallError, ConfigError, FactoryError, PoolError, RetryAfter, ShutdownReport, WorkerError, WorkerExit,
    WorkerFailure,
};

fn failure(name: &str, exit: WorkerExit) -> WorkerFailure {
    WorkerFailure {
        id: Uuid::nil(),
        name: name.to_string(),
        exit,
    }
}

#[test]
fn test_config_error_display() {
    assert_eq!(ConfigError::EmptyName.to_string(), "Name must not be empty");
    assert_eq!(ConfigError::ZeroCapacity.to_string(), "Queue capacity must be greater than zero");
    assert_eq!(
        ConfigError::ZeroDuration("report_interval").to_string(),
        "Duration `report_interval` must be greater than zero"
    );
    assert_eq!(
        ConfigError::QuotaTooLarge { quota: 20_000_000, max: 16_777_215 }.to_string(),
        "Quota 20000000/s exceeds the supported maximum of 16777215/s"
    );
    assert_eq!(
        ConfigError::MissingFactory.to_string(),
        "Workers were requested but no worker factory is configured"
    );
}

#[test]
fn test_pool_error_display() {
    assert_eq!(
        PoolError::Config(ConfigError::ZeroCapacity).to_string(),
        "Configuration error: Queue capacity must be greater than zero"
    );
    assert_eq!(PoolError::InvalidArgument("timeout".into()).to_string(), "Invalid argument: timeout");
    assert_eq!(PoolError::ShuttingDown.to_string(), "Pool is shutting down");
    assert_eq!(PoolError::AlreadyStarted.to_string(), "Pool is already started");
    assert_eq!(PoolError::StartFailed("db down".into()).to_string(), "Pool failed to start: db down");
    assert_eq!(PoolError::Disconnected.to_string(), "Input queue disconnected");
    assert_eq!(
        PoolError::from(FactoryError::CreationFailed("no slots".into())).to_string(),
        "Worker factory failed: Failed to create worker: no slots"
    );

    let failures = vec![
        failure("errors-worker-0", WorkerExit::Panicked("index out of bounds".into())),
        failure("errors-worker-1", WorkerExit::Aborted),
    ];
    assert_eq!(PoolError::WorkerFailures(failures).to_string(), "2 worker(s) ended abnormally");

    let other = PoolError::Other(anyhow!("some internal issue"));
    assert!(other.to_string().contains("some internal issue"));
}

#[test]
fn test_worker_failure_display() {
    let failure = failure("errors-worker-3", WorkerExit::Failed("Resource exhausted: sockets".into()));
    assert_eq!(
        failure.to_string(),
        "errors-worker-3 (00000000-0000-0000-0000-000000000000): failed: Resource exhausted: sockets"
    );
}

#[test]
fn test_shutdown_report() {
    let clean = ShutdownReport {
        workers_joined: 2,
        ..Default::default()
    };
    assert!(clean.is_clean());
    assert_eq!(clean.clone().into_result().unwrap(), clean);

    let leftover = ShutdownReport {
        workers_joined: 2,
        failures: Vec::new(),
        abandoned_items: 5,
    };
    assert!(!leftover.is_clean());
    assert!(leftover.into_result().is_ok());

    let failed = ShutdownReport {
        workers_joined: 1,
        failures: vec![failure("w", WorkerExit::StartFailed("no config".into()))],
        abandoned_items: 0,
    };
    assert!(matches!(failed.into_result(), Err(PoolError::WorkerFailures(f)) if f.len() == 1));
}

#[test]
fn test_api_error_display() {
    assert_eq!(WorkerError::QueueDisconnected.to_string(), "Input queue disconnected");
    assert_eq!(WorkerError::Cancelled.to_string(), "Worker was cancelled");
    assert_eq!(FactoryError::CreationFailed("no slots".into()).to_string(), "Failed to create worker: no slots");
    assert_eq!(CallError::Unavailable.to_string(), "Task is unavailable");
    assert_eq!(CallError::Disabled.to_string(), "Task is disabled");
    assert_eq!(
        CallError::RateExceeded { retry_after: RetryAfter::After(Duration::from_millis(250)) }.to_string(),
        "Rate exceeded, retry after 250ms"
    );

    let wrapped: WorkerError = anyhow!("disk full").into();
    assert_eq!(wrapped.to_string(), "disk full");
}
