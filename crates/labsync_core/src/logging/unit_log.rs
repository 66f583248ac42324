//! Per-unit report logs.
//!
//! A `StageLog` maps unit keys to `UnitLog`s. Every pipeline stage
//! produces one; logs for the same unit merge by set union of entries
//! and conjunction of the validity verdict, so the merge order of
//! stages never changes the result.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::types::EntryKind;

fn default_valid() -> bool {
    true
}

/// Entries recorded against a single sample inside a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleLog {
    #[serde(default = "default_valid")]
    pub valid: bool,
    #[serde(default)]
    pub errors: BTreeSet<String>,
    #[serde(default)]
    pub warnings: BTreeSet<String>,
}

impl Default for SampleLog {
    fn default() -> Self {
        Self {
            valid: true,
            errors: BTreeSet::new(),
            warnings: BTreeSet::new(),
        }
    }
}

impl SampleLog {
    /// Union of entries, conjunction of validity.
    pub fn merge(&mut self, other: &SampleLog) {
        self.valid = self.valid && other.valid;
        self.errors.extend(other.errors.iter().cloned());
        self.warnings.extend(other.warnings.iter().cloned());
    }

    fn normalize(&mut self) {
        if !self.errors.is_empty() {
            self.valid = false;
        }
    }
}

/// Log for one processing unit (batch) from one or more stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitLog {
    /// Coarse verdict: false once any stage reported an error.
    #[serde(default = "default_valid")]
    pub valid: bool,
    /// Local materialization path of the unit, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub errors: BTreeSet<String>,
    #[serde(default)]
    pub warnings: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub infos: BTreeSet<String>,
    /// Per-sample entries, keyed by sample id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub samples: BTreeMap<String, SampleLog>,
}

impl Default for UnitLog {
    fn default() -> Self {
        Self {
            valid: true,
            path: None,
            errors: BTreeSet::new(),
            warnings: BTreeSet::new(),
            infos: BTreeSet::new(),
            samples: BTreeMap::new(),
        }
    }
}

impl UnitLog {
    /// Create an empty, valid unit log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty log annotated with the unit's local path.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Record an entry of the given kind.
    pub fn add(&mut self, kind: EntryKind, message: impl Into<String>) {
        let message = message.into();
        match kind {
            EntryKind::Info => {
                self.infos.insert(message);
            }
            EntryKind::Warning => {
                self.warnings.insert(message);
            }
            EntryKind::Error => {
                self.valid = false;
                self.errors.insert(message);
            }
        }
    }

    /// Record an entry against one sample of this unit.
    ///
    /// A sample error also makes the whole unit invalid.
    pub fn add_sample(&mut self, sample: &str, kind: EntryKind, message: impl Into<String>) {
        let entry = self.samples.entry(sample.to_string()).or_default();
        match kind {
            EntryKind::Error => {
                entry.valid = false;
                entry.errors.insert(message.into());
                self.valid = false;
            }
            EntryKind::Warning | EntryKind::Info => {
                entry.warnings.insert(message.into());
            }
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || self.samples.values().any(|s| !s.errors.is_empty())
    }

    /// Iterate over unit-level entries (errors first).
    pub fn entries(&self) -> impl Iterator<Item = (EntryKind, &str)> {
        self.errors
            .iter()
            .map(|m| (EntryKind::Error, m.as_str()))
            .chain(self.warnings.iter().map(|m| (EntryKind::Warning, m.as_str())))
            .chain(self.infos.iter().map(|m| (EntryKind::Info, m.as_str())))
    }

    /// Merge another log for the same unit into this one.
    pub fn merge(&mut self, other: &UnitLog) {
        self.valid = self.valid && other.valid;
        self.path = match (self.path.take(), other.path.clone()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.errors.extend(other.errors.iter().cloned());
        self.warnings.extend(other.warnings.iter().cloned());
        self.infos.extend(other.infos.iter().cloned());
        for (sample, log) in &other.samples {
            self.samples.entry(sample.clone()).or_default().merge(log);
        }
    }

    /// Make the verdict agree with the recorded entries.
    pub fn normalize(&mut self) {
        for sample in self.samples.values_mut() {
            sample.normalize();
        }
        if self.has_errors() {
            self.valid = false;
        }
    }
}

/// Log of one stage (or a merge of stages), keyed by unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageLog {
    units: BTreeMap<String, UnitLog>,
}

impl StageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a stage log holding a single unit.
    pub fn single(key: impl Into<String>, log: UnitLog) -> Self {
        let mut units = BTreeMap::new();
        units.insert(key.into(), log);
        Self { units }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn unit(&self, key: &str) -> Option<&UnitLog> {
        self.units.get(key)
    }

    /// Get the unit log for `key`, creating an empty one if needed.
    pub fn unit_mut(&mut self, key: &str) -> &mut UnitLog {
        self.units.entry(key.to_string()).or_default()
    }

    pub fn insert(&mut self, key: impl Into<String>, log: UnitLog) {
        self.units.insert(key.into(), log);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &UnitLog)> {
        self.units.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut UnitLog)> {
        self.units.iter_mut()
    }

    pub fn set_path(&mut self, key: &str, path: &Path) {
        self.unit_mut(key).path = Some(path.to_path_buf());
    }

    pub fn add_info(&mut self, key: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("[{}] {}", key, message);
        self.unit_mut(key).add(EntryKind::Info, message);
    }

    pub fn add_warning(&mut self, key: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("[{}] {}", key, message);
        self.unit_mut(key).add(EntryKind::Warning, message);
    }

    pub fn add_error(&mut self, key: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("[{}] {}", key, message);
        self.unit_mut(key).add(EntryKind::Error, message);
    }

    /// Record an error against one sample of a unit.
    pub fn add_sample_error(&mut self, key: &str, sample: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("[{}/{}] {}", key, sample, message);
        self.unit_mut(key).add_sample(sample, EntryKind::Error, message);
    }

    /// Merge every unit of `other` into this log.
    pub fn merge(&mut self, other: &StageLog) {
        for (key, log) in &other.units {
            self.unit_mut(key).merge(log);
        }
    }

    /// Number of units whose verdict is invalid.
    pub fn invalid_units(&self) -> usize {
        self.units.values().filter(|u| !u.valid).count()
    }
}

impl FromIterator<(String, UnitLog)> for StageLog {
    fn from_iter<I: IntoIterator<Item = (String, UnitLog)>>(iter: I) -> Self {
        Self {
            units: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with(errors: &[&str], warnings: &[&str]) -> UnitLog {
        let mut log = UnitLog::new();
        for e in errors {
            log.add(EntryKind::Error, *e);
        }
        for w in warnings {
            log.add(EntryKind::Warning, *w);
        }
        log
    }

    #[test]
    fn error_marks_unit_invalid() {
        let mut log = UnitLog::new();
        assert!(log.valid);
        log.add(EntryKind::Warning, "just a warning");
        assert!(log.valid);
        log.add(EntryKind::Error, "broken");
        assert!(!log.valid);
    }

    #[test]
    fn merge_is_union_and_conjunction() {
        let mut a = log_with(&[], &["w1"]);
        let b = log_with(&["e1"], &["w1", "w2"]);

        a.merge(&b);

        assert!(!a.valid);
        assert_eq!(a.errors.len(), 1);
        assert_eq!(a.warnings.len(), 2);
    }

    #[test]
    fn merge_order_does_not_matter() {
        let fetch = UnitLog::with_path("/data/batch1");
        let normalize = log_with(&[], &["missing optional column"]);
        let validate = log_with(&["sample S2 failed schema"], &[]);

        let mut forward = fetch.clone();
        forward.merge(&normalize);
        forward.merge(&validate);

        let mut backward = validate.clone();
        backward.merge(&normalize);
        backward.merge(&fetch);

        assert_eq!(forward, backward);
    }

    #[test]
    fn sample_error_invalidates_unit() {
        let mut log = UnitLog::new();
        log.add_sample("S1", EntryKind::Error, "upload failed");

        assert!(!log.valid);
        assert!(log.has_errors());
        assert!(!log.samples["S1"].valid);
    }

    #[test]
    fn normalize_fixes_inconsistent_verdict() {
        let mut log: UnitLog = serde_json::from_str(
            r#"{"valid": true, "errors": ["bad"], "warnings": []}"#,
        )
        .unwrap();
        log.normalize();
        assert!(!log.valid);
    }

    #[test]
    fn stage_log_merges_by_key() {
        let mut a = StageLog::new();
        a.add_warning("batch1", "w");
        let mut b = StageLog::new();
        b.add_error("batch1", "e");
        b.add_info("batch2", "ok");

        a.merge(&b);

        assert_eq!(a.len(), 2);
        assert!(!a.unit("batch1").unwrap().valid);
        assert!(a.unit("batch2").unwrap().valid);
        assert_eq!(a.invalid_units(), 1);
    }

    #[test]
    fn stage_log_serializes_as_map() {
        let log = StageLog::single("batch1", UnitLog::with_path("/tmp/batch1"));
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["batch1"]["valid"], true);
        assert_eq!(json["batch1"]["path"], "/tmp/batch1");
    }
}
