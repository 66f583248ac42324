//! Fetched batches (units of work).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::logging::UnitLog;

/// Outcome of materializing a batch locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    /// Every remote file was downloaded.
    Succeeded,
    /// Some files were downloaded, some failed.
    Partial,
    /// Nothing usable was downloaded.
    Failed,
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStatus::Succeeded => write!(f, "succeeded"),
            FetchStatus::Partial => write!(f, "partial"),
            FetchStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One remote folder merged from one or more remote paths and
/// materialized in a local directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Logical key (remote folder name).
    pub key: String,
    /// Local materialization path.
    pub local_path: Option<PathBuf>,
    /// Fetch outcome.
    pub status: FetchStatus,
    /// Errors raised while fetching.
    #[serde(default)]
    pub errors: Vec<String>,
}

impl Batch {
    pub fn new(key: impl Into<String>, local_path: Option<PathBuf>, status: FetchStatus) -> Self {
        Self {
            key: key.into(),
            local_path,
            status,
            errors: Vec::new(),
        }
    }

    /// Build a batch from its fetch-stage log entry.
    ///
    /// Units with a path and no errors succeeded; units with a path and
    /// errors are partial; units without a path failed.
    pub fn from_fetch_log(key: impl Into<String>, log: &UnitLog) -> Self {
        let status = match (&log.path, log.errors.is_empty()) {
            (None, _) => FetchStatus::Failed,
            (Some(_), true) => FetchStatus::Succeeded,
            (Some(_), false) => FetchStatus::Partial,
        };
        Self {
            key: key.into(),
            local_path: log.path.clone(),
            status,
            errors: log.errors.iter().cloned().collect(),
        }
    }

    /// Whether the batch can be handed to the unit processor.
    ///
    /// Requires a local path and no hard fetch failure.
    pub fn is_usable(&self) -> bool {
        self.local_path.is_some() && self.status != FetchStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::EntryKind;

    #[test]
    fn status_follows_fetch_log() {
        let ok = Batch::from_fetch_log("b1", &UnitLog::with_path("/data/b1"));
        assert_eq!(ok.status, FetchStatus::Succeeded);
        assert!(ok.is_usable());

        let mut partial_log = UnitLog::with_path("/data/b2");
        partial_log.add(EntryKind::Error, "could not download r2.fastq.gz");
        let partial = Batch::from_fetch_log("b2", &partial_log);
        assert_eq!(partial.status, FetchStatus::Partial);
        assert_eq!(partial.errors.len(), 1);
        assert!(partial.is_usable());

        let mut failed_log = UnitLog::new();
        failed_log.add(EntryKind::Error, "No files found in remote folder b3");
        let failed = Batch::from_fetch_log("b3", &failed_log);
        assert_eq!(failed.status, FetchStatus::Failed);
        assert!(!failed.is_usable());
    }
}
