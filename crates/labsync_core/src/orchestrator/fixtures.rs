//! Test doubles for the stage traits and drop-off seeding helpers.

use std::fs;
use std::path::Path;

use serde_json::{json, Value};

use crate::logging::StageLog;
use crate::models::SampleRecord;
use crate::stages::{
    FetchOutput, Fetcher, NormalizeRequest, Normalizer, StageError, StageResult, ValidateRequest,
    ValidationOutcome, Validator,
};

/// Create `root/<key>/<sub>/` with the lab inputs and read pairs for `samples`.
pub fn seed_batch(root: &Path, key: &str, sub: &str, samples: &[&str]) {
    let dir = root.join(key).join(sub);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("lab_metadata_{}.xlsx", key)), b"xlsx").unwrap();
    fs::write(dir.join(format!("samples_data_{}.json", key)), b"{}").unwrap();
    for id in samples {
        fs::write(dir.join(format!("{}_R1.fastq.gz", id)), b"@r1").unwrap();
        fs::write(dir.join(format!("{}_R2.fastq.gz", id)), b"@r2").unwrap();
    }
}

pub fn sample(id: &str) -> SampleRecord {
    sample_with_files(id, &format!("{}_R1.fastq.gz", id), &format!("{}_R2.fastq.gz", id))
}

pub fn sample_with_files(id: &str, r1: &str, r2: &str) -> SampleRecord {
    match json!({
        "sequencing_sample_id": id,
        "sequence_file_R1_fastq": r1,
        "sequence_file_R2_fastq": r2,
    }) {
        Value::Object(map) => SampleRecord::new(map),
        _ => unreachable!(),
    }
}

/// Fetcher returning nothing.
pub struct EmptyFetcher;

impl Fetcher for EmptyFetcher {
    fn fetch(&self) -> StageResult<FetchOutput> {
        Ok(FetchOutput::default())
    }
}

enum NormalizerMode {
    Write,
    Silent,
    Fail,
}

pub struct FakeNormalizer {
    mode: NormalizerMode,
}

impl FakeNormalizer {
    /// Writes `lab_metadata_<key>.json` into the output folder.
    pub fn writing() -> Self {
        Self {
            mode: NormalizerMode::Write,
        }
    }

    /// Succeeds without writing any output.
    pub fn silent() -> Self {
        Self {
            mode: NormalizerMode::Silent,
        }
    }

    pub fn failing() -> Self {
        Self {
            mode: NormalizerMode::Fail,
        }
    }
}

impl Normalizer for FakeNormalizer {
    fn normalize(&self, request: &NormalizeRequest) -> StageResult<StageLog> {
        let mut log = StageLog::new();
        match self.mode {
            NormalizerMode::Write => {
                let out = request
                    .output_folder
                    .join(format!("lab_metadata_{}.json", request.unit_key));
                fs::write(&out, b"[]").map_err(|e| StageError::io("write normalized", e))?;
                log.add_info(&request.unit_key, "normalized");
            }
            NormalizerMode::Silent => log.add_info(&request.unit_key, "nothing written"),
            NormalizerMode::Fail => {
                return Err(StageError::command_failed("relecov-tools", 1, "bad sheet"))
            }
        }
        Ok(log)
    }
}

/// Returns fixed record partitions; can be told to fail for one unit.
pub struct FakeValidator {
    valid: Vec<SampleRecord>,
    invalid: Vec<SampleRecord>,
    fail_for: Option<String>,
}

impl FakeValidator {
    pub fn new(valid: &[&str], invalid: &[&str]) -> Self {
        Self::from_records(
            valid.iter().map(|id| sample(id)).collect(),
            invalid.iter().map(|id| sample(id)).collect(),
        )
    }

    pub fn from_records(valid: Vec<SampleRecord>, invalid: Vec<SampleRecord>) -> Self {
        Self {
            valid,
            invalid,
            fail_for: None,
        }
    }

    pub fn failing_for(mut self, key: &str) -> Self {
        self.fail_for = Some(key.to_string());
        self
    }
}

impl Validator for FakeValidator {
    fn validate(&self, request: &ValidateRequest) -> StageResult<ValidationOutcome> {
        if self.fail_for.as_deref() == Some(request.unit_key.as_str()) {
            return Err(StageError::other("validator crashed"));
        }
        let mut log = StageLog::new();
        let mut valid = self.valid.clone();
        for r in &mut valid {
            r.valid = true;
        }
        let mut invalid = self.invalid.clone();
        for r in &mut invalid {
            r.errors.push("Failed schema validation".to_string());
            log.add_sample_error(&request.unit_key, r.sample_id(), "Failed schema validation");
        }
        log.add_info(&request.unit_key, "validated");
        Ok(ValidationOutcome {
            valid,
            invalid,
            log,
        })
    }
}
