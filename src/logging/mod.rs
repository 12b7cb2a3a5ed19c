// Logging module - tracing subscriber setup for the binary
//
// Human-readable output goes to stderr. When file logging is enabled, a JSON
// layer is added on a non-blocking rolling writer so logs can be parsed later
// with jq. The returned guard must live until exit or buffered lines are lost.
//
// Precedence for the filter: RUST_LOG env var > config file > "info"

use crate::config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when RUST_LOG is unset
pub fn default_directive(level: &str) -> String {
    format!("chatmount={}", level)
}

fn rolling_appender(config: &LoggingConfig) -> RollingFileAppender {
    RollingFileAppender::new(
        config.file_rotation.into(),
        &config.file_dir,
        &config.file_prefix,
    )
}

/// Install the global subscriber
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directive(&config.level).into());
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if !config.file_enabled {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr)
            .init();
        return None;
    }

    if let Err(e) = std::fs::create_dir_all(&config.file_dir) {
        eprintln!(
            "Warning: Could not create log directory {:?}: {}",
            config.file_dir, e
        );
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr)
            .init();
        return None;
    }

    // Writes happen on a background thread
    let (non_blocking, guard) = tracing_appender::non_blocking(rolling_appender(config));
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();
    Some(guard)
}
