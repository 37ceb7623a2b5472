use crate::config::LoggingConfig;
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs the process-wide subscriber: console output plus a daily rolling
/// log file. Dropping the returned guard flushes the file writer, so callers
/// keep it alive until the process exits.
pub fn init_logging(config: &LoggingConfig, log_dir: &Path) -> anyhow::Result<WorkerGuard> {
    fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, &config.file_name);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))?;

    let file_layer = if config.json {
        fmt::layer()
            .json()
            .with_writer(non_blocking_writer)
            .boxed()
    } else {
        fmt::layer()
            .with_ansi(false)
            .with_writer(non_blocking_writer)
            .boxed()
    };

    let console_layer = fmt::layer().with_writer(std::io::stdout);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    Ok(guard)
}
