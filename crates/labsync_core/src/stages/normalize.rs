//! Normalize stage backed by an external metadata reader.

use std::time::Duration;

use super::command::run_stage_command;
use super::{NormalizeRequest, Normalizer, StageResult};
use crate::config::ReadLabMetadataSettings;
use crate::logging::StageLog;

const STAGE_NAME: &str = "read-lab-metadata";

/// Runs `<program> <args..> --metadata-file .. --sample-list-file .. --output-folder ..`.
#[derive(Debug, Clone)]
pub struct CommandNormalizer {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandNormalizer {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn from_settings(settings: &ReadLabMetadataSettings) -> Self {
        Self::new(
            settings.program.clone(),
            settings.args.clone(),
            settings.timeout(),
        )
    }

    fn command_args(&self, request: &NormalizeRequest) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend([
            "--metadata-file".to_string(),
            request.metadata_file.display().to_string(),
            "--sample-list-file".to_string(),
            request.sample_list_file.display().to_string(),
            "--output-folder".to_string(),
            request.output_folder.display().to_string(),
        ]);
        args
    }
}

impl Normalizer for CommandNormalizer {
    fn normalize(&self, request: &NormalizeRequest) -> StageResult<StageLog> {
        let mut log = StageLog::new();
        run_stage_command(
            STAGE_NAME,
            &request.unit_key,
            &self.program,
            &self.command_args(request),
            self.timeout,
            &mut log,
        )?;
        log.add_info(
            &request.unit_key,
            format!("Read lab metadata {}", request.metadata_file.display()),
        );
        Ok(log)
    }
}
