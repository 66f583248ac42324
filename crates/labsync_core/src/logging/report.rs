//! Report rendering (JSON document + tabular CSV).

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::unit_log::StageLog;

/// Counts shown at the top of every report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTotals {
    pub units: usize,
    pub valid_units: usize,
    pub invalid_units: usize,
    pub samples_with_errors: usize,
}

impl ReportTotals {
    pub fn from_logs(logs: &StageLog) -> Self {
        let invalid_units = logs.invalid_units();
        let samples_with_errors = logs
            .iter()
            .map(|(_, unit)| unit.samples.values().filter(|s| !s.errors.is_empty()).count())
            .sum();
        Self {
            units: logs.len(),
            valid_units: logs.len() - invalid_units,
            invalid_units,
            samples_with_errors,
        }
    }
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    module: &'a str,
    generated_at: String,
    totals: ReportTotals,
    logs: &'a StageLog,
}

/// Timestamp prefix used in report file names.
pub fn file_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d%H%M%S").to_string()
}

/// Path of the tabular companion of a JSON report.
pub fn tabular_path(json_path: &Path) -> PathBuf {
    json_path.with_extension("csv")
}

/// Write the JSON report for `logs` to `path` (overwrites).
pub fn write_json_report(path: &Path, module: &str, logs: &StageLog) -> io::Result<()> {
    let doc = ReportDocument {
        module,
        generated_at: chrono::Local::now().to_rfc3339(),
        totals: ReportTotals::from_logs(logs),
        logs,
    };
    let json = serde_json::to_string_pretty(&doc)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    write_atomic(path, json.as_bytes())
}

/// Write one CSV row per log entry: unit, sample, level, message.
pub fn write_tabular_report(path: &Path, logs: &StageLog) -> io::Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["unit", "sample", "level", "message"])?;

    for (key, unit) in logs.iter() {
        for (kind, message) in unit.entries() {
            writer.write_record([key, "", kind.to_string().as_str(), message])?;
        }
        for (sample, log) in &unit.samples {
            for message in &log.errors {
                writer.write_record([key, sample.as_str(), "error", message.as_str()])?;
            }
            for message in &log.warnings {
                writer.write_record([key, sample.as_str(), "warning", message.as_str()])?;
            }
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    write_atomic(path, &bytes)
}

/// Write to a temp file next to `path`, then rename over it.
fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    fs::rename(&temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::UnitLog;
    use tempfile::tempdir;

    #[test]
    fn json_report_has_totals() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");

        let mut logs = StageLog::new();
        logs.insert("ok", UnitLog::new());
        logs.add_error("bad", "missing inputs");
        logs.add_sample_error("bad", "S1", "upload failed");

        write_json_report(&path, "metadata", &logs).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["module"], "metadata");
        assert_eq!(value["totals"]["units"], 2);
        assert_eq!(value["totals"]["invalid_units"], 1);
        assert_eq!(value["totals"]["samples_with_errors"], 1);
        assert_eq!(value["logs"]["bad"]["valid"], false);
    }

    #[test]
    fn tabular_report_lists_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.csv");

        let mut logs = StageLog::new();
        logs.add_warning("batch1", "Found 1 invalid samples in batch1");
        logs.add_sample_error("batch1", "S9", "Could not upload r1.fastq.gz");

        write_tabular_report(&path, &logs).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "unit,sample,level,message");
        assert!(lines.iter().any(|l| l.starts_with("batch1,,warning,")));
        assert!(lines.iter().any(|l| l.starts_with("batch1,S9,error,")));
    }

    #[test]
    fn empty_logs_write_header_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");

        write_tabular_report(&path, &StageLog::new()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), "unit,sample,level,message");
    }

    #[test]
    fn rewrite_overwrites_previous_report() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");

        let mut first = StageLog::new();
        first.add_error("a", "old error");
        write_json_report(&path, "metadata", &first).unwrap();
        write_json_report(&path, "metadata", &StageLog::new()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("old error"));
        assert!(!dir.path().join("report.json.tmp").exists());
    }

    #[test]
    fn tabular_path_swaps_extension() {
        let p = tabular_path(Path::new("/x/b1_metadata_report.json"));
        assert_eq!(p, PathBuf::from("/x/b1_metadata_report.csv"));
    }
}
