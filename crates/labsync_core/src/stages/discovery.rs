//! Locating stage inputs and outputs by file-name pattern.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use regex::Regex;

/// Files directly inside `dir` whose name matches `pattern`, sorted by name.
///
/// An unreadable directory or invalid pattern yields no matches.
pub fn find_matching(dir: &Path, pattern: &str) -> Vec<PathBuf> {
    let re = match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!("Invalid file pattern '{}': {}", pattern, e);
            return Vec::new();
        }
    };
    let entries = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) => {
            tracing::debug!("Cannot scan {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut found: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .map(|n| re.is_match(&n.to_string_lossy()))
                .unwrap_or(false)
        })
        .collect();
    found.sort();
    found
}

/// Most recently modified match for `pattern` in `dir`.
///
/// Ties resolve to the lexically last name.
pub fn find_newest(dir: &Path, pattern: &str) -> Option<PathBuf> {
    newest_modified(find_matching(dir, pattern))
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Most recently modified of `paths`; ties resolve to the lexically last.
pub fn newest_modified(paths: impl IntoIterator<Item = PathBuf>) -> Option<PathBuf> {
    paths
        .into_iter()
        .map(|p| (modified(&p).unwrap_or(SystemTime::UNIX_EPOCH), p))
        .max()
        .map(|(_, p)| p)
}

/// Modification times of the files in a folder, taken before a stage runs.
///
/// Stage outputs land in the batch folder, which survives between runs.
/// A file counts as written by the stage only if it is new since the
/// capture or its modification time changed.
#[derive(Debug, Clone, Default)]
pub struct DirSnapshot {
    seen: HashMap<PathBuf, SystemTime>,
}

impl DirSnapshot {
    /// Record the files directly inside `dir`. A missing folder is empty.
    pub fn capture(dir: &Path) -> Self {
        let seen = match fs::read_dir(dir) {
            Ok(entries) => entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .filter_map(|p| modified(&p).map(|m| (p, m)))
                .collect(),
            Err(_) => HashMap::new(),
        };
        Self { seen }
    }

    /// Whether `path` was created or rewritten since the capture.
    pub fn is_fresh(&self, path: &Path) -> bool {
        match self.seen.get(path) {
            None => true,
            Some(before) => modified(path).is_some_and(|now| now != *before),
        }
    }

    /// Newest match for `pattern` in `dir` written since the capture.
    pub fn find_newest_fresh(&self, dir: &Path, pattern: &str) -> Option<PathBuf> {
        newest_modified(
            find_matching(dir, pattern)
                .into_iter()
                .filter(|p| self.is_fresh(p)),
        )
    }
}
