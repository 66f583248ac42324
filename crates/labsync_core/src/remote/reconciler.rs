//! Selective write-back to the remote drop-off.
//!
//! Deletion happens in two phases. `delete_confirmed` only removes files
//! matched to records the validator accepted; `delete_remainder` later
//! removes the non-sequence leftovers that the fetcher itself downloaded.
//! Files uploaded here are never in the fetch manifest, so neither phase
//! can remove them.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{is_sequence_file, remote_join, RemoteClient, RemoteResult};
use crate::logging::StageLog;
use crate::models::SampleRecord;
use crate::stages::find_newest;

/// Pattern of the blank metadata template pushed on invalid records.
const TEMPLATE_PATTERN: &str = r"metadata_templat.*\.xlsx$";

/// Outcome of an upload pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub uploaded: Vec<PathBuf>,
    /// Already present remotely (matched by file name).
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

impl UploadReport {
    fn extend(&mut self, other: UploadReport) {
        self.uploaded.extend(other.uploaded);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }
}

pub struct RemoteReconciler {
    client: Arc<dyn RemoteClient>,
    /// Remote folder -> files the fetcher downloaded from it.
    finished_folders: BTreeMap<String, Vec<String>>,
    /// Remote folder -> files removed during this run.
    deleted: BTreeMap<String, BTreeSet<String>>,
}

impl RemoteReconciler {
    pub fn new(
        client: Arc<dyn RemoteClient>,
        finished_folders: BTreeMap<String, Vec<String>>,
    ) -> Self {
        Self {
            client,
            finished_folders,
            deleted: BTreeMap::new(),
        }
    }

    /// Manifest folders belonging to `key`.
    fn manifest_dirs<'a>(
        &'a self,
        key: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Vec<String>)> {
        self.finished_folders.iter().filter(move |(dir, _)| {
            dir.as_str() == key
                || dir
                    .strip_prefix(key)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// Remote folders of `key` that were fetched in this run.
    pub fn list_remote_subfolders(&self, key: &str) -> RemoteResult<Vec<String>> {
        let remote = self.client.list_folders(key)?;
        Ok(remote
            .into_iter()
            .filter(|dir| self.finished_folders.contains_key(dir))
            .collect())
    }

    /// Upload files that are not yet present in `remote_dir`.
    ///
    /// Presence is checked by file name. Failures are reported, not raised.
    pub fn upload_missing(&self, local_paths: &[PathBuf], remote_dir: &str) -> UploadReport {
        let mut existing = self.remote_listing(remote_dir);
        self.upload_against(&mut existing, local_paths, remote_dir)
    }

    fn remote_listing(&self, remote_dir: &str) -> HashSet<String> {
        match self.client.list_files(remote_dir) {
            Ok(files) => files.into_iter().collect(),
            Err(e) => {
                tracing::warn!("Could not list remote folder {}: {}", remote_dir, e);
                HashSet::new()
            }
        }
    }

    /// Uploaded names are added to `existing`.
    fn upload_against(
        &self,
        existing: &mut HashSet<String>,
        local_paths: &[PathBuf],
        remote_dir: &str,
    ) -> UploadReport {
        let mut report = UploadReport::default();
        for path in local_paths {
            let name = match path.file_name() {
                Some(n) => n.to_string_lossy().to_string(),
                None => {
                    report.failed.push(path.clone());
                    continue;
                }
            };
            if existing.contains(&name) {
                tracing::debug!("{} already in {}, skipping upload", name, remote_dir);
                report.skipped.push(path.clone());
                continue;
            }
            if path.is_file() && self.client.upload_file(path, &remote_join(remote_dir, &name)) {
                tracing::info!("Uploaded {} to {}", name, remote_dir);
                existing.insert(name);
                report.uploaded.push(path.clone());
            } else {
                report.failed.push(path.clone());
            }
        }
        report
    }

    /// Upload the read files referenced by every invalid record.
    ///
    /// Files resolve against the record's own directory, falling back to
    /// `fallback_dir`. Each failure becomes an error entry on the record's
    /// sample in `log`.
    pub fn upload_invalid_records(
        &self,
        key: &str,
        invalid: &[SampleRecord],
        remote_dir: &str,
        fallback_dir: &Path,
        log: &mut StageLog,
    ) -> UploadReport {
        let mut existing = self.remote_listing(remote_dir);
        let mut total = UploadReport::default();

        for record in invalid {
            let dir = record.local_dir().unwrap_or_else(|| fallback_dir.to_path_buf());
            let paths: Vec<PathBuf> = record.filenames().iter().map(|f| dir.join(f)).collect();
            let report = self.upload_against(&mut existing, &paths, remote_dir);
            for failed in &report.failed {
                log.add_sample_error(
                    key,
                    record.sample_id(),
                    format!("Could not upload {} to {}", failed.display(), remote_dir),
                );
            }
            total.extend(report);
        }
        total
    }

    /// Push the newest metadata template from `template_folder`.
    pub fn upload_template(
        &self,
        key: &str,
        template_folder: &Path,
        remote_dir: &str,
        log: &mut StageLog,
    ) -> bool {
        let template = match find_newest(template_folder, TEMPLATE_PATTERN) {
            Some(t) => t,
            None => {
                log.add_error(
                    key,
                    format!("No metadata template found in {}", template_folder.display()),
                );
                return false;
            }
        };
        self.upload_report_file(key, &template, remote_dir, log)
    }

    /// Upload one local file, overwriting any remote copy.
    pub fn upload_report_file(
        &self,
        key: &str,
        local: &Path,
        remote_dir: &str,
        log: &mut StageLog,
    ) -> bool {
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if local.is_file() && self.client.upload_file(local, &remote_join(remote_dir, &name)) {
            tracing::info!("Uploaded {} to {}", name, remote_dir);
            true
        } else {
            log.add_error(
                key,
                format!("Could not upload {} to {}", local.display(), remote_dir),
            );
            false
        }
    }

    /// Delete files confirmed valid for `key`.
    ///
    /// Only names in `files` that the fetcher downloaded from a folder of
    /// `key` are considered. Returns the names actually removed.
    pub fn delete_confirmed(
        &mut self,
        key: &str,
        files: &[String],
        log: &mut StageLog,
    ) -> Vec<String> {
        let confirmed: HashSet<&str> = files.iter().map(String::as_str).collect();
        let plan: Vec<(String, Vec<String>)> = self
            .manifest_dirs(key)
            .map(|(dir, manifest)| {
                let names = manifest
                    .iter()
                    .filter(|n| confirmed.contains(n.as_str()))
                    .cloned()
                    .collect();
                (dir.clone(), names)
            })
            .collect();

        self.delete_planned(key, plan, log)
    }

    /// Delete what is left of `key` after confirmed files are gone.
    ///
    /// Sequence files and files already deleted are kept out. Empty
    /// remote folders are cleaned afterwards.
    pub fn delete_remainder(&mut self, key: &str, log: &mut StageLog) -> Vec<String> {
        let plan: Vec<(String, Vec<String>)> = self
            .manifest_dirs(key)
            .map(|(dir, manifest)| {
                let already = self.deleted.get(dir);
                let names = manifest
                    .iter()
                    .filter(|n| !is_sequence_file(n))
                    .filter(|n| !already.is_some_and(|d| d.contains(*n)))
                    .cloned()
                    .collect();
                (dir.clone(), names)
            })
            .collect();

        let deleted = self.delete_planned(key, plan, log);

        if let Err(e) = self.client.clean_empty_folders(key) {
            log.add_warning(key, format!("Could not clean remote folder {}: {}", key, e));
        }
        deleted
    }

    fn delete_planned(
        &mut self,
        key: &str,
        plan: Vec<(String, Vec<String>)>,
        log: &mut StageLog,
    ) -> Vec<String> {
        let mut removed = Vec::new();
        for (dir, names) in plan {
            if names.is_empty() {
                continue;
            }
            match self.client.delete_files(&dir, &names) {
                Ok(deleted) => {
                    tracing::info!("Deleted {} files from {}", deleted.len(), dir);
                    self.deleted
                        .entry(dir.clone())
                        .or_default()
                        .extend(deleted.iter().cloned());
                    removed.extend(deleted);
                }
                Err(e) => {
                    log.add_error(key, format!("Could not delete files from {}: {}", dir, e));
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{LocalMirror, RemoteError};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    fn record(id: &str, r1: &str, r2: &str) -> SampleRecord {
        let value = json!({
            "sequencing_sample_id": id,
            "sequence_file_R1_fastq": r1,
            "sequence_file_R2_fastq": r2,
        });
        match value {
            serde_json::Value::Object(map) => SampleRecord::new(map),
            _ => unreachable!(),
        }
    }

    fn manifest(entries: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(dir, files)| {
                let files = files.iter().map(|f| f.to_string()).collect();
                (dir.to_string(), files)
            })
            .collect()
    }

    /// Records uploads and deletes; listing comes from a fixed set.
    #[derive(Default)]
    struct RecordingRemote {
        listed: Vec<String>,
        fail_uploads: bool,
        uploads: Mutex<Vec<String>>,
        deletes: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl RemoteClient for RecordingRemote {
        fn list_keys(&self) -> RemoteResult<Vec<String>> {
            Ok(Vec::new())
        }
        fn list_folders(&self, key: &str) -> RemoteResult<Vec<String>> {
            Ok(vec![format!("{}/run1", key), format!("{}/run2", key)])
        }
        fn list_files(&self, _dir: &str) -> RemoteResult<Vec<String>> {
            Ok(self.listed.clone())
        }
        fn download_file(&self, remote: &str, _local: &Path) -> RemoteResult<()> {
            Err(RemoteError::NotFound(remote.to_string()))
        }
        fn upload_file(&self, _local: &Path, remote: &str) -> bool {
            self.uploads.lock().push(remote.to_string());
            !self.fail_uploads
        }
        fn delete_files(&self, dir: &str, names: &[String]) -> RemoteResult<Vec<String>> {
            self.deletes.lock().push((dir.to_string(), names.to_vec()));
            Ok(names.to_vec())
        }
        fn clean_empty_folders(&self, _key: &str) -> RemoteResult<()> {
            Ok(())
        }
    }

    #[test]
    fn subfolders_are_limited_to_fetched_ones() {
        let remote = Arc::new(RecordingRemote::default());
        let reconciler = RemoteReconciler::new(remote, manifest(&[("lab/run2", &["a"])]));
        assert_eq!(reconciler.list_remote_subfolders("lab").unwrap(), vec!["lab/run2"]);
    }

    #[test]
    fn upload_skips_files_already_present() {
        let dir = tempdir().unwrap();
        let present = dir.path().join("S1_R1.fastq.gz");
        let missing = dir.path().join("S1_R2.fastq.gz");
        touch(&present);
        touch(&missing);

        let remote = Arc::new(RecordingRemote {
            listed: vec!["S1_R1.fastq.gz".to_string()],
            ..Default::default()
        });
        let reconciler = RemoteReconciler::new(remote.clone(), BTreeMap::new());

        let report = reconciler.upload_missing(&[present.clone(), missing.clone()], "lab/run1");

        assert_eq!(report.skipped, vec![present]);
        assert_eq!(report.uploaded, vec![missing]);
        assert_eq!(*remote.uploads.lock(), vec!["lab/run1/S1_R2.fastq.gz"]);
    }

    #[test]
    fn failed_record_uploads_are_logged_per_sample() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("S2_R1.fastq.gz"));

        let remote = Arc::new(RecordingRemote {
            fail_uploads: true,
            ..Default::default()
        });
        let reconciler = RemoteReconciler::new(remote, BTreeMap::new());
        let mut log = StageLog::new();

        let report = reconciler.upload_invalid_records(
            "lab",
            &[record("S2", "S2_R1.fastq.gz", "S2_R2.fastq.gz")],
            "lab/run1",
            dir.path(),
            &mut log,
        );

        assert_eq!(report.failed.len(), 2);
        let unit = log.unit("lab").unwrap();
        assert!(!unit.valid);
        assert_eq!(unit.samples["S2"].errors.len(), 2);
        assert!(unit.samples["S2"]
            .errors
            .iter()
            .all(|e| e.starts_with("Could not upload")));
    }

    #[test]
    fn shared_record_file_is_uploaded_once() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("S2_R1.fastq.gz"));
        touch(&dir.path().join("S3_R1.fastq.gz"));
        touch(&dir.path().join("pooled_R2.fastq.gz"));

        let remote = Arc::new(RecordingRemote::default());
        let reconciler = RemoteReconciler::new(remote.clone(), BTreeMap::new());
        let mut log = StageLog::new();

        let report = reconciler.upload_invalid_records(
            "lab",
            &[
                record("S2", "S2_R1.fastq.gz", "pooled_R2.fastq.gz"),
                record("S3", "S3_R1.fastq.gz", "pooled_R2.fastq.gz"),
            ],
            "lab/run1",
            dir.path(),
            &mut log,
        );

        assert_eq!(report.uploaded.len(), 3);
        assert_eq!(report.skipped, vec![dir.path().join("pooled_R2.fastq.gz")]);
        assert_eq!(
            *remote.uploads.lock(),
            vec![
                "lab/run1/S2_R1.fastq.gz",
                "lab/run1/pooled_R2.fastq.gz",
                "lab/run1/S3_R1.fastq.gz",
            ]
        );
        assert!(log.is_empty());
    }

    #[test]
    fn missing_template_is_an_error_entry() {
        let dir = tempdir().unwrap();
        let remote = Arc::new(RecordingRemote::default());
        let reconciler = RemoteReconciler::new(remote, BTreeMap::new());
        let mut log = StageLog::new();

        assert!(!reconciler.upload_template("lab", dir.path(), "lab/run1", &mut log));
        assert!(log.unit("lab").unwrap().errors.iter().any(|e| e.contains("template")));
    }

    #[test]
    fn uploads_newest_template() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("metadata_template_v1.xlsx"));
        touch(&dir.path().join("notes.txt"));
        let remote = Arc::new(RecordingRemote::default());
        let reconciler = RemoteReconciler::new(remote.clone(), BTreeMap::new());
        let mut log = StageLog::new();

        assert!(reconciler.upload_template("lab", dir.path(), "lab/run1", &mut log));
        assert_eq!(*remote.uploads.lock(), vec!["lab/run1/metadata_template_v1.xlsx"]);
    }

    #[test]
    fn confirmed_deletion_only_touches_valid_files() {
        let remote = Arc::new(RecordingRemote::default());
        let mut reconciler = RemoteReconciler::new(
            remote.clone(),
            manifest(&[
                ("lab/run1", &["A_R1.fastq.gz", "B_R1.fastq.gz", "meta.xlsx"]),
                ("other/run1", &["A_R1.fastq.gz"]),
            ]),
        );
        let mut log = StageLog::new();

        let deleted = reconciler.delete_confirmed(
            "lab",
            &["A_R1.fastq.gz".to_string(), "not_fetched.fastq.gz".to_string()],
            &mut log,
        );

        assert_eq!(deleted, vec!["A_R1.fastq.gz"]);
        let calls = remote.deletes.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "lab/run1");
        assert_eq!(calls[0].1, vec!["A_R1.fastq.gz"]);
    }

    #[test]
    fn remainder_keeps_sequence_files() {
        let remote = Arc::new(RecordingRemote::default());
        let mut reconciler = RemoteReconciler::new(
            remote.clone(),
            manifest(&[(
                "lab/run1",
                &["A_R1.fastq.gz", "B_R1.fastq.gz", "meta.xlsx", "samples.json"],
            )]),
        );
        let mut log = StageLog::new();

        reconciler.delete_confirmed("lab", &["A_R1.fastq.gz".to_string()], &mut log);
        let deleted = reconciler.delete_remainder("lab", &mut log);

        assert_eq!(deleted, vec!["meta.xlsx", "samples.json"]);
        assert!(log.unit("lab").is_none());
    }

    #[test]
    fn reconciliation_is_idempotent_on_mirror() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("remote/lab/run1/A_R1.fastq.gz"));
        touch(&dir.path().join("remote/lab/run1/meta.xlsx"));
        let mirror = Arc::new(LocalMirror::new(dir.path().join("remote")));
        let files = manifest(&[("lab/run1", &["A_R1.fastq.gz", "meta.xlsx"])]);
        let mut log = StageLog::new();

        let mut first = RemoteReconciler::new(mirror.clone(), files.clone());
        first.delete_confirmed("lab", &["A_R1.fastq.gz".to_string()], &mut log);
        first.delete_remainder("lab", &mut log);
        assert!(!dir.path().join("remote/lab").exists());

        let mut second = RemoteReconciler::new(mirror, files);
        assert!(second
            .delete_confirmed("lab", &["A_R1.fastq.gz".to_string()], &mut log)
            .is_empty());
        assert!(second.delete_remainder("lab", &mut log).is_empty());
        assert!(log.is_empty());
    }
}
