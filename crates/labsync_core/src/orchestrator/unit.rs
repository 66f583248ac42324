//! Per-unit processing: normalize, validate, reconcile, report.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::errors::{UnitError, UnitResult};
use super::types::UnitOutput;
use crate::logging::{LogSummary, StageLog};
use crate::models::Batch;
use crate::remote::RemoteReconciler;
use crate::stages::{
    find_matching, find_newest, newest_modified, DirSnapshot, NormalizeRequest, Normalizer,
    ValidateRequest, Validator,
};

const METADATA_PATTERN: &str = r"lab_metadata.*\.xlsx";
const SAMPLES_PATTERN: &str = r"samples_data.*\.json";
const NORMALIZED_PATTERN: &str = r"^lab_metadata.*\.json$";
const TABULAR_REPORT_PATTERN: &str = r"metadata_report\.csv$";
const REPORT_SUFFIX: &str = "_metadata_report.json";

/// Drives one fetched batch through the stages and reconciliation.
pub struct UnitProcessor {
    normalizer: Box<dyn Normalizer>,
    validator: Box<dyn Validator>,
    /// Folder holding the blank metadata template.
    template_folder: PathBuf,
}

impl UnitProcessor {
    pub fn new(
        normalizer: Box<dyn Normalizer>,
        validator: Box<dyn Validator>,
        template_folder: impl Into<PathBuf>,
    ) -> Self {
        Self {
            normalizer,
            validator,
            template_folder: template_folder.into(),
        }
    }

    /// Remote folder for `key`; exactly one fetched folder must match.
    fn resolve_remote_dir(
        &self,
        key: &str,
        reconciler: &RemoteReconciler,
    ) -> UnitResult<String> {
        let mut candidates = reconciler.list_remote_subfolders(key)?;
        match candidates.len() {
            0 => Err(UnitError::remote_folder_not_found(key)),
            1 => Ok(candidates.remove(0)),
            _ => Err(UnitError::ambiguous_remote_folder(key, candidates)),
        }
    }

    /// Process one batch.
    ///
    /// Errors abort this unit only. Everything that happens after
    /// validation is logged into the returned merged log instead.
    pub fn process(
        &self,
        batch: &Batch,
        fetch_log: &StageLog,
        reconciler: &mut RemoteReconciler,
        summary: &LogSummary,
    ) -> UnitResult<UnitOutput> {
        let key = batch.key.as_str();
        let local = batch
            .local_path
            .as_deref()
            .ok_or_else(|| UnitError::missing_local_path(key))?;
        let remote_dir = self.resolve_remote_dir(key, reconciler)?;
        tracing::info!("Processing {} (remote folder {})", key, remote_dir);

        let metadata_file = find_newest(local, METADATA_PATTERN);
        let sample_list_file = find_newest(local, SAMPLES_PATTERN);
        let (metadata_file, sample_list_file) = match (metadata_file, sample_list_file) {
            (Some(m), Some(s)) => (m, s),
            (None, Some(_)) => return Err(UnitError::missing_inputs(key, "metadata file")),
            (Some(_), None) => return Err(UnitError::missing_inputs(key, "samples file")),
            (None, None) => return Err(UnitError::missing_inputs(key, "metadata/samples files")),
        };

        let before_normalize = DirSnapshot::capture(local);
        let normalize_log = self
            .normalizer
            .normalize(&NormalizeRequest {
                unit_key: key.to_string(),
                metadata_file: metadata_file.clone(),
                sample_list_file,
                output_folder: local.to_path_buf(),
            })
            .map_err(|e| UnitError::stage("read-lab-metadata", e))?;

        let structured = find_normalized_output(local, &before_normalize)
            .ok_or_else(|| UnitError::missing_normalized_output(key))?;

        let outcome = self
            .validator
            .validate(&ValidateRequest {
                unit_key: key.to_string(),
                structured_metadata_file: structured,
                original_metadata_file: metadata_file,
                output_folder: local.to_path_buf(),
            })
            .map_err(|e| UnitError::stage("validate", e))?;

        let mut merged = summary.merge_logs(key, &[fetch_log, &normalize_log, &outcome.log]);
        merged.set_path(key, local);

        if !outcome.invalid.is_empty() {
            merged.add_warning(
                key,
                format!("Found {} invalid samples in {}", outcome.invalid.len(), key),
            );
            reconciler.upload_template(key, &self.template_folder, &remote_dir, &mut merged);
            reconciler.upload_invalid_records(
                key,
                &outcome.invalid,
                &remote_dir,
                local,
                &mut merged,
            );
        }

        // A file shared with a rejected record is never confirmed.
        let rejected: HashSet<&str> = outcome
            .invalid
            .iter()
            .flat_map(|r| r.filenames())
            .collect();
        let valid_files: Vec<String> = outcome
            .valid
            .iter()
            .flat_map(|r| r.filenames())
            .filter(|name| !rejected.contains(name))
            .map(str::to_string)
            .collect();
        reconciler.delete_confirmed(key, &valid_files, &mut merged);
        reconciler.delete_remainder(key, &mut merged);

        let report_path =
            self.write_unit_report(key, local, &remote_dir, reconciler, summary, &mut merged);

        Ok(UnitOutput {
            key: key.to_string(),
            log: merged,
            valid: outcome.valid,
            invalid_count: outcome.invalid.len(),
            report_path,
        })
    }

    /// Write `<key>_metadata_report.json` (+ CSV) and upload the CSV.
    fn write_unit_report(
        &self,
        key: &str,
        local: &Path,
        remote_dir: &str,
        reconciler: &RemoteReconciler,
        summary: &LogSummary,
        merged: &mut StageLog,
    ) -> Option<PathBuf> {
        let path = local.join(format!("{}{}", key, REPORT_SUFFIX));
        let written = summary.create_error_summary("metadata", Some(&path), Some(&*merged), true);
        if let Err(e) = written {
            merged.add_error(key, format!("Could not write {}: {}", path.display(), e));
            return None;
        }

        match find_newest(local, TABULAR_REPORT_PATTERN) {
            Some(csv) => {
                reconciler.upload_report_file(key, &csv, remote_dir, merged);
            }
            None => merged.add_error(
                key,
                format!("No metadata_report.csv found in {}", local.display()),
            ),
        }
        Some(path)
    }
}

/// Newest normalizer output written since `before`, ignoring our own
/// report files.
fn find_normalized_output(dir: &Path, before: &DirSnapshot) -> Option<PathBuf> {
    newest_modified(
        find_matching(dir, NORMALIZED_PATTERN)
            .into_iter()
            .filter(|p| {
                !p.file_name()
                    .is_some_and(|n| n.to_string_lossy().ends_with(REPORT_SUFFIX))
            })
            .filter(|p| before.is_fresh(p)),
    )
}
