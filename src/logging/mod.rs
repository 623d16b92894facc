//! Logging initialization with environment-based formatters
//!
//! - Production: Structured JSON logs for log aggregation
//! - Anything else: Colorful, human-readable logs for development
//!
//! `LOG_FORMAT=json|pretty` overrides the environment-derived choice.
//! `LOG_DIR` additionally writes the same records to a daily-rotated file.

use std::path::Path;

use crate::config::{get_environment, is_production};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE_PREFIX: &str = "voltwatch";
const MAX_LOG_FILES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn resolve(environment: &str, explicit: Option<&str>) -> Self {
        match explicit.map(str::to_ascii_lowercase).as_deref() {
            Some("json") => LogFormat::Json,
            Some("pretty") | Some("text") => LogFormat::Pretty,
            _ if is_production(environment) => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Non-blocking writer to `dir/voltwatch.<date>.log`, rotated daily, keeping
/// the newest five files. Records are flushed when the guard is dropped.
pub fn rolling_file_writer(dir: impl AsRef<Path>) -> Result<(NonBlocking, WorkerGuard), InitError> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(dir)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Initialize the global subscriber. `RUST_LOG` overrides the default `info` filter.
///
/// Keep the returned guard alive for the life of the process when `LOG_DIR` is set.
pub fn init_logging() -> Result<Option<WorkerGuard>, InitError> {
    let format = LogFormat::resolve(
        &get_environment(),
        std::env::var("LOG_FORMAT").ok().as_deref(),
    );
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_writer, guard) = match std::env::var("LOG_DIR")
        .ok()
        .filter(|dir| !dir.trim().is_empty())
    {
        Some(dir) => {
            let (writer, guard) = rolling_file_writer(dir)?;
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(std::io::stdout),
            )
            .with(file_writer.map(|writer| {
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(writer)
            }))
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(true)
                    .with_writer(std::io::stdout),
            )
            // No colour codes in files
            .with(file_writer.map(|writer| {
                fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false)
                    .with_writer(writer)
            }))
            .init(),
    }

    Ok(guard)
}
