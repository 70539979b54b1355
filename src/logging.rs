use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::error::{AppError, Result};

const LOG_FILE_PREFIX: &str = "alerter.log";
const LOG_FILES_KEPT: usize = 3;

/// Console plus a daily-rolling file under `log_dir`.
/// The returned guard must live as long as the process so the file is flushed.
pub fn init(level: &str, log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(LOG_FILES_KEPT)
        .build(log_dir)
        .map_err(|e| AppError::Config(format!("cannot open log file in {}: {e}", log_dir.display())))?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_filter(filter(level));
    let stdout_layer = fmt::layer().with_filter(filter(level));

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}

// HTTP client internals are noisy at debug; keep them at warn.
fn filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("{level},hyper=warn,reqwest=warn"))
}
