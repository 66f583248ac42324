//! Sample metadata records produced by the normalizer.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field holding the sample identifier.
pub const SAMPLE_ID_FIELD: &str = "sequencing_sample_id";
/// Field holding the primary read file name.
pub const R1_FILE_FIELD: &str = "sequence_file_R1_fastq";
/// Field holding the secondary read file name.
pub const R2_FILE_FIELD: &str = "sequence_file_R2_fastq";
/// Field holding the local directory of the read files.
pub const R1_PATH_FIELD: &str = "r1_fastq_filepath";

/// One row of subject/sequencing metadata.
///
/// The filename pair (R1 + optional R2) is the key used to map the
/// record back to remote artifacts during reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    /// Schema-defined fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    /// Set by the validator.
    #[serde(skip)]
    pub valid: bool,
    /// Validation errors for this record.
    #[serde(skip)]
    pub errors: Vec<String>,
}

impl SampleRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            valid: false,
            errors: Vec::new(),
        }
    }

    fn str_field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Sample identifier, or `"unknown"` when the field is missing.
    pub fn sample_id(&self) -> &str {
        self.str_field(SAMPLE_ID_FIELD).unwrap_or("unknown")
    }

    pub fn r1_file(&self) -> Option<&str> {
        self.str_field(R1_FILE_FIELD)
    }

    pub fn r2_file(&self) -> Option<&str> {
        self.str_field(R2_FILE_FIELD)
    }

    /// Referenced read file names (R1 first).
    pub fn filenames(&self) -> Vec<&str> {
        self.r1_file().into_iter().chain(self.r2_file()).collect()
    }

    /// Local directory holding the read files, if recorded.
    pub fn local_dir(&self) -> Option<PathBuf> {
        self.str_field(R1_PATH_FIELD).map(PathBuf::from)
    }
}

/// Parse a JSON array of sample objects.
pub fn records_from_json(content: &str) -> Result<Vec<SampleRecord>, serde_json::Error> {
    let rows: Vec<Map<String, Value>> = serde_json::from_str(content)?;
    Ok(rows.into_iter().map(SampleRecord::new).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> SampleRecord {
        match value {
            Value::Object(map) => SampleRecord::new(map),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn exposes_filename_pair() {
        let r = record(json!({
            "sequencing_sample_id": "S1",
            "sequence_file_R1_fastq": "S1_R1.fastq.gz",
            "sequence_file_R2_fastq": "S1_R2.fastq.gz",
            "r1_fastq_filepath": "/data/b1"
        }));

        assert_eq!(r.sample_id(), "S1");
        assert_eq!(r.filenames(), vec!["S1_R1.fastq.gz", "S1_R2.fastq.gz"]);
        assert_eq!(r.local_dir(), Some(PathBuf::from("/data/b1")));
    }

    #[test]
    fn blank_secondary_file_is_ignored() {
        let r = record(json!({
            "sequence_file_R1_fastq": "S2.fastq.gz",
            "sequence_file_R2_fastq": "  "
        }));

        assert_eq!(r.filenames(), vec!["S2.fastq.gz"]);
        assert_eq!(r.sample_id(), "unknown");
    }

    #[test]
    fn parses_json_array() {
        let records =
            records_from_json(r#"[{"sequencing_sample_id": "A"}, {"sequencing_sample_id": "B"}]"#)
                .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].sample_id(), "B");
    }

    #[test]
    fn serializes_fields_only() {
        let mut r = record(json!({"sequencing_sample_id": "S1"}));
        r.valid = true;
        let out = serde_json::to_value(&r).unwrap();
        assert_eq!(out, json!({"sequencing_sample_id": "S1"}));
    }
}
