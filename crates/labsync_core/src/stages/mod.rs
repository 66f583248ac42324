//! Stage adapters: fetch, normalize, validate.
//!
//! Each stage returns its result together with a stage-local `StageLog`
//! keyed by unit. The orchestrator only sees the traits below; the
//! concrete adapters shell out to the configured tools (`CommandNormalizer`,
//! `CommandValidator`) or copy from a mounted drop-off (`MirrorFetcher`).

mod command;
mod discovery;
mod fetch;
mod normalize;
mod validate;

pub use command::{classify_line, run_command, run_stage_command, stderr_tail, CommandOutput};
pub use discovery::{find_matching, find_newest, newest_modified, DirSnapshot};
pub use fetch::MirrorFetcher;
pub use normalize::CommandNormalizer;
pub use validate::CommandValidator;

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::logging::StageLog;
use crate::models::{Batch, SampleRecord};

/// Error raised by a stage collaborator.
#[derive(Error, Debug)]
pub enum StageError {
    /// The external tool exited unsuccessfully.
    #[error("{program} failed with exit code {exit_code}: {message}")]
    CommandFailed {
        program: String,
        exit_code: i32,
        message: String,
    },

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("{0}")]
    Other(String),
}

impl StageError {
    pub fn command_failed(
        program: impl Into<String>,
        exit_code: i32,
        message: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            program: program.into(),
            exit_code,
            message: message.into(),
        }
    }

    pub fn spawn(program: impl Into<String>, source: io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn parse(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            what: what.into(),
            message: message.into(),
        }
    }

    pub fn timeout(program: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            program: program.into(),
            secs,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

pub type StageResult<T> = Result<T, StageError>;

/// Everything the fetch stage produced.
#[derive(Debug, Default)]
pub struct FetchOutput {
    /// Batches in processing order.
    pub batches: Vec<Batch>,
    /// Remote folder -> file names downloaded from it.
    pub finished_folders: BTreeMap<String, Vec<String>>,
    /// Fetch log keyed by batch.
    pub log: StageLog,
}

/// Materializes remote folders locally, one batch per remote key.
pub trait Fetcher {
    fn fetch(&self) -> StageResult<FetchOutput>;
}

/// Inputs of the normalize stage.
#[derive(Debug, Clone)]
pub struct NormalizeRequest {
    pub unit_key: String,
    pub metadata_file: PathBuf,
    pub sample_list_file: PathBuf,
    pub output_folder: PathBuf,
}

/// Turns the lab spreadsheet and sample list into structured metadata.
///
/// Implementations write their output into `output_folder`; the caller
/// discovers it by name.
pub trait Normalizer {
    fn normalize(&self, request: &NormalizeRequest) -> StageResult<StageLog>;
}

/// Inputs of the validate stage.
#[derive(Debug, Clone)]
pub struct ValidateRequest {
    pub unit_key: String,
    pub structured_metadata_file: PathBuf,
    pub original_metadata_file: PathBuf,
    pub output_folder: PathBuf,
}

/// Partition of the structured records.
#[derive(Debug, Default)]
pub struct ValidationOutcome {
    pub valid: Vec<SampleRecord>,
    pub invalid: Vec<SampleRecord>,
    pub log: StageLog,
}

/// Splits structured metadata into valid and invalid records.
pub trait Validator {
    fn validate(&self, request: &ValidateRequest) -> StageResult<ValidationOutcome>;
}
