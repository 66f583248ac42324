//! Error types for the orchestrator.
//!
//! `UnitError` aborts one unit and is contained by the run loop.
//! `RunError` ends the whole run.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::remote::RemoteError;
use crate::stages::StageError;

/// Unit-level failure; recorded against the unit, never propagated.
#[derive(Error, Debug)]
pub enum UnitError {
    #[error("Could not find {key} folder in remote")]
    RemoteFolderNotFound { key: String },

    #[error(
        "Ambiguous remote folder for {key}: {} candidates ({})",
        .candidates.len(),
        .candidates.join(", ")
    )]
    AmbiguousRemoteFolder { key: String, candidates: Vec<String> },

    #[error("Batch {key} has no local path")]
    MissingLocalPath { key: String },

    #[error("No {what} found for {key} after download")]
    MissingInputs { key: String, what: String },

    #[error("No metadata json found for {key} after read-lab-metadata")]
    MissingNormalizedOutput { key: String },

    /// A stage collaborator failed for this unit.
    #[error("{stage} failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: StageError,
    },

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl UnitError {
    pub fn remote_folder_not_found(key: impl Into<String>) -> Self {
        Self::RemoteFolderNotFound { key: key.into() }
    }

    pub fn ambiguous_remote_folder(key: impl Into<String>, candidates: Vec<String>) -> Self {
        Self::AmbiguousRemoteFolder {
            key: key.into(),
            candidates,
        }
    }

    pub fn missing_local_path(key: impl Into<String>) -> Self {
        Self::MissingLocalPath { key: key.into() }
    }

    pub fn missing_inputs(key: impl Into<String>, what: impl Into<String>) -> Self {
        Self::MissingInputs {
            key: key.into(),
            what: what.into(),
        }
    }

    pub fn missing_normalized_output(key: impl Into<String>) -> Self {
        Self::MissingNormalizedOutput { key: key.into() }
    }

    pub fn stage(stage: impl Into<String>, source: StageError) -> Self {
        Self::Stage {
            stage: stage.into(),
            source,
        }
    }
}

/// Run-level failure; the run stops.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("No batches were fetched; nothing to reconcile")]
    NoBatches,

    #[error("Fetch stage failed: {0}")]
    Fetch(#[from] StageError),

    #[error("Could not write report {path}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RunError {
    pub fn report(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Report {
            path: path.into(),
            source,
        }
    }
}

pub type UnitResult<T> = Result<T, UnitError>;

pub type RunResult<T> = Result<T, RunError>;
