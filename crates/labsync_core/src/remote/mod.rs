//! Remote drop-off access and reconciliation.
//!
//! `RemoteClient` is the transfer seam; `LocalMirror` implements it over a
//! mounted directory tree. `RemoteReconciler` is the only component that
//! writes to or deletes from the remote side.

mod mirror;
mod reconciler;

pub use mirror::LocalMirror;
pub use reconciler::{RemoteReconciler, UploadReport};

use std::io;
use std::path::Path;

use thiserror::Error;

/// Errors from the remote transfer client.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Remote path not found: {0}")]
    NotFound(String),

    #[error("Remote I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },
}

impl RemoteError {
    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Transfer client for the remote drop-off location.
///
/// Remote paths are `/`-separated and relative to the drop-off root
/// (`key/subfolder/file`).
pub trait RemoteClient: Send + Sync {
    /// Top-level folder names (unit keys).
    fn list_keys(&self) -> RemoteResult<Vec<String>>;

    /// Folders under `key` holding files, as remote paths.
    fn list_folders(&self, key: &str) -> RemoteResult<Vec<String>>;

    /// File names (not paths) directly inside `dir`.
    fn list_files(&self, dir: &str) -> RemoteResult<Vec<String>>;

    fn download_file(&self, remote: &str, local: &Path) -> RemoteResult<()>;

    /// Upload one file. Returns `false` on failure.
    fn upload_file(&self, local: &Path, remote: &str) -> bool;

    /// Delete the named files from `dir`, returning the names removed.
    ///
    /// Names not present remotely are ignored.
    fn delete_files(&self, dir: &str, names: &[String]) -> RemoteResult<Vec<String>>;

    /// Remove empty folders under `key`, then `key` itself if empty.
    fn clean_empty_folders(&self, key: &str) -> RemoteResult<()>;
}

/// Join remote path segments with `/`.
pub fn remote_join(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name.trim_start_matches('/'))
    }
}

/// Whether `name` is a raw sequence file.
pub fn is_sequence_file(name: &str) -> bool {
    const SUFFIXES: [&str; 4] = [".fastq", ".fq", ".fastq.gz", ".fq.gz"];
    let lower = name.to_ascii_lowercase();
    SUFFIXES.iter().any(|s| lower.ends_with(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_remote_paths() {
        assert_eq!(remote_join("b1/run1", "a.txt"), "b1/run1/a.txt");
        assert_eq!(remote_join("b1/", "/a.txt"), "b1/a.txt");
        assert_eq!(remote_join("", "a.txt"), "a.txt");
    }

    #[test]
    fn detects_sequence_files() {
        assert!(is_sequence_file("S1_R1.fastq.gz"));
        assert!(is_sequence_file("S1.FQ"));
        assert!(is_sequence_file("S1_R2.fq.gz"));
        assert!(!is_sequence_file("lab_metadata.xlsx"));
        assert!(!is_sequence_file("samples_data.json"));
    }
}
