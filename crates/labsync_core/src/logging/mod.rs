//! Logging infrastructure for labsync.
//!
//! This module provides:
//! - Global `tracing` setup (stderr + optional log file)
//! - Per-unit report logs (`UnitLog`, `StageLog`)
//! - The run-scoped aggregator that merges stage logs and writes reports
//!
//! # Example
//!
//! ```no_run
//! use labsync_core::logging::{LogSummary, StageLog};
//!
//! let mut summary = LogSummary::new("/path/to/output/logs");
//!
//! let mut fetch = StageLog::new();
//! fetch.add_info("batch_01", "Downloaded 12 files");
//! let mut validate = StageLog::new();
//! validate.add_error("batch_01", "Sample S3 failed schema validation");
//!
//! let merged = summary.merge_logs("batch_01", &[&fetch, &validate]);
//! summary.record_unit("batch_01", merged.unit("batch_01").unwrap());
//! summary.create_error_summary("wrapper", None, None, true).unwrap();
//! ```

mod report;
mod summary;
mod types;
mod unit_log;

pub use report::{file_timestamp, tabular_path, ReportTotals};
pub use summary::LogSummary;
pub use types::{EntryKind, LogLevel};
pub use unit_log::{SampleLog, StageLog, UnitLog};

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// File name of the diagnostic log inside the log directory.
pub const LOG_FILE_NAME: &str = "labsync.log";

/// Initialize the global tracing subscriber.
///
/// This sets up a subscriber that:
/// - Respects RUST_LOG environment variable
/// - Falls back to the provided default level
/// - Outputs to stderr with timestamps
/// - Also writes to `<log_dir>/labsync.log` when `log_dir` is given
///
/// Returns the file writer guard; keep it alive until exit so buffered
/// lines are flushed. Should be called once at application startup.
pub fn init_tracing(default_level: LogLevel, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter_str()));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    guard
}

/// Initialize tracing for tests (only logs warnings and above).
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
