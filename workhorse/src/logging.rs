// Logging for workhorse
//
// Pools, workers and rate limiters emit `tracing` events with structured
// fields (`pool`, `worker`, `state`, `limiter`). This module wires those events
// to a subscriber and provides the span/event macros used across the crate.
//
// # Usage Examples
//
// ```rust
// use workhorse::logging;
//
// // INFO level, console output
// logging::init(logging::LogConfig::default());
//
// // Or one of the presets
// logging::init_development();
// logging::init_production();
// ```
//
// Inside the crate and in applications built on it:
//
// ```rust
// let span = workhorse::worker_span!("errors-worker-0", worker_id);
// let _guard = span.enter();
// workhorse::log_lifecycle!("errors-worker-0", "started");
// workhorse::log_pool!("errors", "worker_added", total = 3);
// ```

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::{Mutex, Once};

use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Configuration for the logging subscriber.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Emit one JSON object per event instead of human-readable lines
    pub json_format: bool,
    /// Include file and line information
    pub show_file_line: bool,
    /// Include thread name/id, useful when several pools share a runtime
    pub show_thread_info: bool,
    /// Include timestamps
    pub show_time: bool,
    /// Target filter expressions (format: "target=level,target2=level2,...")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

// Only the first initialization takes effect.
static INIT: Once = Once::new();

fn build_filter(config: &LogConfig) -> EnvFilter {
    let mut env_filter = EnvFilter::from_default_env().add_directive(config.level.into());

    if let Some(filters) = &config.target_filters {
        for filter in filters.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            match filter.parse() {
                Ok(directive) => env_filter = env_filter.add_directive(directive),
                Err(err) => eprintln!("Ignoring invalid log filter '{}': {}", filter, err),
            }
        }
    }

    env_filter
}

/// Initialize logging with the given configuration.
///
/// Safe to call multiple times; only the first call takes effect.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let registry = tracing_subscriber::registry().with(build_filter(&config));

        let subscriber: Box<dyn Subscriber + Send + Sync> = match (config.json_format, config.show_time) {
            (true, _) => Box::new(registry.with(fmt::layer().json().flatten_event(true))),
            (false, true) => Box::new(registry.with(console_layer(&config))),
            (false, false) => Box::new(registry.with(console_layer(&config).without_time())),
        };

        set_global_subscriber(subscriber);
    });
}

fn console_layer<S>(config: &LogConfig) -> fmt::Layer<S>
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_ansi(atty::is(atty::Stream::Stdout))
        .with_file(config.show_file_line)
        .with_line_number(config.show_file_line)
        .with_thread_names(config.show_thread_info)
        .with_thread_ids(config.show_thread_info)
}

fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// Initialize logging to the console and to a file opened in append mode.
///
/// The file is opened once up front, so an unwritable path is reported here
/// rather than silently swallowed on the first event.
///
/// # Errors
/// - [`io::ErrorKind::AlreadyExists`] if logging was already initialized; the
///   file layer is not installed and the file is left untouched
/// - Any error from opening or creating the file
pub fn init_with_file(config: LogConfig, log_file: impl AsRef<Path>) -> io::Result<()> {
    if INIT.is_completed() {
        return Err(already_initialized());
    }
    let file = OpenOptions::new().create(true).append(true).open(log_file.as_ref())?;

    let mut installed = false;
    INIT.call_once(|| {
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_thread_ids(true);

        let subscriber = tracing_subscriber::registry()
            .with(build_filter(&config))
            .with(console_layer(&config))
            .with(file_layer);

        set_global_subscriber(subscriber);
        installed = true;
    });

    if installed {
        Ok(())
    } else {
        Err(already_initialized())
    }
}

fn already_initialized() -> io::Error {
    io::Error::new(io::ErrorKind::AlreadyExists, "logging is already initialized")
}

/// DEBUG level, worker state changes at TRACE, colored console output.
pub fn init_development() {
    init(LogConfig {
        level: Level::DEBUG,
        target_filters: Some("workhorse=debug,workhorse::worker=trace,workhorse_api=trace".to_string()),
        ..Default::default()
    });
}

/// INFO level, JSON lines, no file/line information.
pub fn init_production() {
    init(LogConfig {
        level: Level::INFO,
        json_format: true,
        show_file_line: false,
        show_thread_info: true,
        show_time: true,
        target_filters: None,
    });
}

/// WARN level, compact output without timestamps, for test binaries.
pub fn init_test() {
    init(LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        show_time: false,
        target_filters: None,
    });
}

/// Span covering the life of one worker.
///
/// ```rust
/// let span = workhorse::worker_span!("errors-worker-0", "3f2a...");
/// let _guard = span.enter();
/// ```
#[macro_export]
macro_rules! worker_span {
    ($name:expr, $id:expr) => {
        tracing::info_span!("worker", worker = %$name, id = %$id)
    };
    ($name:expr, $id:expr, $($fields:tt)*) => {
        tracing::info_span!("worker", worker = %$name, id = %$id, $($fields)*)
    };
}

/// Span covering a pool-level operation such as startup or shutdown.
#[macro_export]
macro_rules! pool_span {
    ($pool:expr, $operation:expr) => {
        tracing::info_span!("pool", pool = %$pool, operation = $operation)
    };
    ($pool:expr, $operation:expr, $($fields:tt)*) => {
        tracing::info_span!("pool", pool = %$pool, operation = $operation, $($fields)*)
    };
}

/// Log a worker lifecycle event (started, stopping, stopped).
#[macro_export]
macro_rules! log_lifecycle {
    ($worker:expr, $event:expr) => {
        tracing::info!(worker = %$worker, event = $event)
    };
    ($worker:expr, $event:expr, $($fields:tt)*) => {
        tracing::info!(worker = %$worker, event = $event, $($fields)*)
    };
}

/// Log a pool event (worker added/removed, shutdown phases).
#[macro_export]
macro_rules! log_pool {
    ($pool:expr, $event:expr) => {
        tracing::info!(pool = %$pool, event = $event)
    };
    ($pool:expr, $event:expr, $($fields:tt)*) => {
        tracing::info!(pool = %$pool, event = $event, $($fields)*)
    };
}

/// Log an error with optional context fields.
#[macro_export]
macro_rules! log_error {
    ($error:expr) => {
        tracing::error!(error = %$error)
    };
    ($error:expr, $($fields:tt)*) => {
        tracing::error!(error = %$error, $($fields)*)
    };
}
