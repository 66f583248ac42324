//! Run loop: fetch once, process units one at a time, summarize.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::errors::{RunError, RunResult, UnitError};
use super::types::{RunCounters, RunSummary};
use super::unit::UnitProcessor;
use crate::logging::{file_timestamp, LogSummary, StageLog, UnitLog};
use crate::models::Batch;
use crate::remote::{RemoteClient, RemoteReconciler};
use crate::stages::Fetcher;

/// Module name used in run-level report files.
const RUN_MODULE: &str = "wrapper";

/// Top-level pipeline driver.
///
/// Units are processed sequentially in fetch order. A unit-level error
/// is recorded against that unit and the loop moves on; only an empty
/// fetch (or a fetch that cannot run at all) ends the run early.
pub struct Orchestrator {
    fetcher: Box<dyn Fetcher>,
    client: Arc<dyn RemoteClient>,
    processor: UnitProcessor,
    /// Folder for run-level reports.
    logs_folder: PathBuf,
}

impl Orchestrator {
    pub fn new(
        fetcher: Box<dyn Fetcher>,
        client: Arc<dyn RemoteClient>,
        processor: UnitProcessor,
        logs_folder: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            client,
            processor,
            logs_folder: logs_folder.into(),
        }
    }

    pub fn run(&self) -> RunResult<RunSummary> {
        let fetched = self.fetcher.fetch()?;
        if fetched.batches.is_empty() {
            tracing::error!("No batches were fetched; nothing to reconcile");
            return Err(RunError::NoBatches);
        }

        let mut summary = LogSummary::new(&self.logs_folder);
        let fetch_log = summary.prepare_final_logs(fetched.log);
        let mut reconciler = RemoteReconciler::new(self.client.clone(), fetched.finished_folders);
        let mut counters = RunCounters {
            fetched: fetched.batches.len(),
            ..Default::default()
        };
        let mut valid_records = BTreeMap::new();

        for batch in &fetched.batches {
            let key = batch.key.as_str();

            if !batch.is_usable() {
                tracing::warn!("Skipping {}: fetch {}", key, batch.status);
                counters.skipped += 1;
                summary.record_unit(key, fetch_log.unit(key).unwrap_or(&UnitLog::new()));
                continue;
            }

            match self.processor.process(batch, &fetch_log, &mut reconciler, &summary) {
                Ok(output) => {
                    counters.processed += 1;
                    counters.valid_samples += output.valid.len();
                    counters.invalid_samples += output.invalid_count;
                    if let Some(log) = output.unit_log() {
                        summary.record_unit(key, log);
                    }
                    valid_records.insert(output.key, output.valid);
                }
                Err(e) => {
                    counters.failed += 1;
                    self.record_failure(&mut summary, batch, &fetch_log, &e);
                }
            }
        }

        let report_path = summary
            .create_error_summary(RUN_MODULE, None, None, true)
            .map_err(|e| RunError::report(&self.logs_folder, e))?;

        tracing::info!(
            "Run finished: {} fetched, {} processed, {} failed, {} skipped",
            counters.fetched,
            counters.processed,
            counters.failed,
            counters.skipped
        );

        Ok(RunSummary {
            logs: summary.logs().clone(),
            counters,
            valid_records,
            report_path,
        })
    }

    /// Record a unit-level error and write that unit's failure report.
    fn record_failure(
        &self,
        summary: &mut LogSummary,
        batch: &Batch,
        fetch_log: &StageLog,
        error: &UnitError,
    ) {
        let key = batch.key.as_str();
        let mut log = summary.merge_logs(key, &[fetch_log]);
        log.add_error(key, format!("Could not process folder {}: {}", key, error));
        if let Some(unit) = log.unit(key) {
            summary.record_unit(key, unit);
        }

        let dir = batch
            .local_path
            .clone()
            .unwrap_or_else(|| self.logs_folder.clone());
        let path = dir.join(format!("{}_{}_{}_summary.json", file_timestamp(), key, RUN_MODULE));
        if let Err(e) = summary.create_error_summary(RUN_MODULE, Some(&path), Some(&log), false) {
            tracing::error!("Could not write failure report for {}: {}", key, e);
        }
    }
}
