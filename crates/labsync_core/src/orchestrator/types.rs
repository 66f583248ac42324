//! Result types passed between the unit processor and the run loop.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::logging::{StageLog, UnitLog};
use crate::models::SampleRecord;

/// What one unit hands back to the run loop.
#[derive(Debug, Clone)]
pub struct UnitOutput {
    pub key: String,
    /// Merged log holding only this unit.
    pub log: StageLog,
    pub valid: Vec<SampleRecord>,
    pub invalid_count: usize,
    /// Per-unit report, when it could be written.
    pub report_path: Option<PathBuf>,
}

impl UnitOutput {
    pub fn unit_log(&self) -> Option<&UnitLog> {
        self.log.unit(&self.key)
    }
}

/// Run-level counts, logged at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    /// Batches returned by the fetcher.
    pub fetched: usize,
    /// Units that ran to completion.
    pub processed: usize,
    /// Units aborted by a unit-level error.
    pub failed: usize,
    /// Units not processed because their fetch was unusable.
    pub skipped: usize,
    pub valid_samples: usize,
    pub invalid_samples: usize,
}

/// Final aggregation of one run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Unit key -> merged log, for every fetched batch.
    pub logs: StageLog,
    pub counters: RunCounters,
    /// Valid records per processed unit.
    pub valid_records: BTreeMap<String, Vec<SampleRecord>>,
    /// Consolidated report written at the end of the run.
    pub report_path: PathBuf,
}

impl RunSummary {
    /// Whether every unit came through clean.
    pub fn all_valid(&self) -> bool {
        self.logs.invalid_units() == 0
    }
}
