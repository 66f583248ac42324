//! Run-scoped log aggregator.
//!
//! One `LogSummary` is created at the start of a run and passed to the
//! components that need it. It owns the run-level logs and is the only
//! place that writes aggregated reports to disk.

use std::io;
use std::path::{Path, PathBuf};

use super::report::{file_timestamp, tabular_path, write_json_report, write_tabular_report};
use super::unit_log::{StageLog, UnitLog};

pub struct LogSummary {
    /// Default folder for reports written without an explicit path.
    output_location: PathBuf,
    /// Run-level logs, one entry per unit.
    logs: StageLog,
}

impl LogSummary {
    pub fn new(output_location: impl Into<PathBuf>) -> Self {
        Self {
            output_location: output_location.into(),
            logs: StageLog::new(),
        }
    }

    pub fn output_location(&self) -> &Path {
        &self.output_location
    }

    /// Run-level logs collected so far.
    pub fn logs(&self) -> &StageLog {
        &self.logs
    }

    /// Normalize a stage's raw log before it is merged or reported.
    ///
    /// Units that recorded errors are marked invalid, whatever their
    /// stored verdict says.
    pub fn prepare_final_logs(&self, mut raw: StageLog) -> StageLog {
        for (_, unit) in raw.iter_mut() {
            unit.normalize();
        }
        raw
    }

    /// Merge the entries for `key` from every stage log into one log.
    ///
    /// Stage logs without an entry for `key` contribute nothing.
    pub fn merge_logs(&self, key: &str, logs: &[&StageLog]) -> StageLog {
        let mut merged = UnitLog::new();
        for log in logs {
            if let Some(unit) = log.unit(key) {
                merged.merge(unit);
            }
        }
        merged.normalize();
        StageLog::single(key, merged)
    }

    pub fn add_error(&mut self, key: &str, entry: impl Into<String>) {
        self.logs.add_error(key, entry);
    }

    pub fn add_warning(&mut self, key: &str, entry: impl Into<String>) {
        self.logs.add_warning(key, entry);
    }

    /// Fold a finished unit's log into the run-level logs.
    pub fn record_unit(&mut self, key: &str, log: &UnitLog) {
        self.logs.unit_mut(key).merge(log);
    }

    /// Write an aggregated report.
    ///
    /// `filepath` defaults to `<output_location>/<timestamp>_<module>_log_summary.json`
    /// and `logs` defaults to the run-level logs. With `tabular`, a CSV
    /// copy is written next to the JSON file. Empty logs still produce a
    /// (placeholder) report.
    pub fn create_error_summary(
        &self,
        module: &str,
        filepath: Option<&Path>,
        logs: Option<&StageLog>,
        tabular: bool,
    ) -> io::Result<PathBuf> {
        let path = match filepath {
            Some(p) => p.to_path_buf(),
            None => self
                .output_location
                .join(format!("{}_{}_log_summary.json", file_timestamp(), module)),
        };
        let logs = logs.unwrap_or(&self.logs);

        write_json_report(&path, module, logs)?;
        tracing::info!("Wrote {} report to {}", module, path.display());

        if tabular {
            let csv_path = tabular_path(&path);
            write_tabular_report(&csv_path, logs)?;
            tracing::debug!("Wrote tabular {} report to {}", module, csv_path.display());
        }

        Ok(path)
    }
}
