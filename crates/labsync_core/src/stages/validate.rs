//! Validate stage backed by an external schema validator.
//!
//! The tool writes `validated_*.json` and `invalid_*.json` record arrays
//! into its output folder; the newest of each written by this call is
//! read back. Partition files left over from earlier runs are ignored.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::command::run_stage_command;
use super::discovery::DirSnapshot;
use super::{StageError, StageResult, ValidateRequest, ValidationOutcome, Validator};
use crate::config::ValidateSettings;
use crate::logging::StageLog;
use crate::models::{records_from_json, SampleRecord};

const STAGE_NAME: &str = "validate";
const VALID_PATTERN: &str = r"^validated_.*\.json$";
const INVALID_PATTERN: &str = r"^invalid_.*\.json$";
const SCHEMA_ERROR: &str = "Failed schema validation";

#[derive(Debug, Clone)]
pub struct CommandValidator {
    program: String,
    args: Vec<String>,
    json_schema_file: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl CommandValidator {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            args,
            json_schema_file: None,
            timeout,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<PathBuf>) -> Self {
        self.json_schema_file = Some(schema.into());
        self
    }

    pub fn from_settings(settings: &ValidateSettings) -> Self {
        let validator = Self::new(
            settings.program.clone(),
            settings.args.clone(),
            settings.timeout(),
        );
        match settings.schema_path() {
            Some(schema) => validator.with_schema(schema),
            None => validator,
        }
    }

    fn command_args(&self, request: &ValidateRequest) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend([
            "--json-file".to_string(),
            request.structured_metadata_file.display().to_string(),
            "--metadata".to_string(),
            request.original_metadata_file.display().to_string(),
            "--out-folder".to_string(),
            request.output_folder.display().to_string(),
        ]);
        if let Some(schema) = &self.json_schema_file {
            args.push("--json-schema-file".to_string());
            args.push(schema.display().to_string());
        }
        args
    }
}

/// Read the newest fresh record file matching `pattern`; absent means none.
fn read_partition(
    snapshot: &DirSnapshot,
    dir: &Path,
    pattern: &str,
    valid: bool,
) -> StageResult<Vec<SampleRecord>> {
    let Some(path) = snapshot.find_newest_fresh(dir, pattern) else {
        return Ok(Vec::new());
    };
    let content = fs::read_to_string(&path)
        .map_err(|e| StageError::io(format!("reading {}", path.display()), e))?;
    let mut records = records_from_json(&content)
        .map_err(|e| StageError::parse(path.display().to_string(), e.to_string()))?;
    for record in &mut records {
        record.valid = valid;
        if !valid {
            record.errors.push(SCHEMA_ERROR.to_string());
        }
    }
    Ok(records)
}

impl Validator for CommandValidator {
    fn validate(&self, request: &ValidateRequest) -> StageResult<ValidationOutcome> {
        let mut log = StageLog::new();
        let snapshot = DirSnapshot::capture(&request.output_folder);
        run_stage_command(
            STAGE_NAME,
            &request.unit_key,
            &self.program,
            &self.command_args(request),
            self.timeout,
            &mut log,
        )?;

        let dir = &request.output_folder;
        let valid = read_partition(&snapshot, dir, VALID_PATTERN, true)?;
        let invalid = read_partition(&snapshot, dir, INVALID_PATTERN, false)?;

        for record in &invalid {
            for error in &record.errors {
                log.add_sample_error(&request.unit_key, record.sample_id(), error.as_str());
            }
        }
        log.add_info(
            &request.unit_key,
            format!(
                "Validation: {} valid, {} invalid records",
                valid.len(),
                invalid.len()
            ),
        );

        Ok(ValidationOutcome { valid, invalid, log })
    }
}
