//! # Structured Logging
//!
//! Installs the process-wide `tracing` subscriber. Components log through the `tracing`
//! macros with structured fields (`service`, `instance_id`, `url`, `status`), so the JSON
//! output can be indexed without parsing messages.
//!
//! `RUST_LOG` takes precedence over the configured level when it is set.

use tracing::{warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::observability::config::{LogConfig, LogFormat};

/// Map a configured level name to a `tracing` level, defaulting to INFO
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize the global subscriber
///
/// Calling this twice (tests, embedding binaries) leaves the first subscriber in place.
pub fn init_logging(config: &LogConfig) {
    let level = parse_level(&config.level);
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let result = match config.format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init(),
        LogFormat::Text => Registry::default()
            .with(env_filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init(),
    };

    if result.is_err() {
        warn!("Tracing subscriber already initialized, skipping initialization");
    }
}
