//! Fetch stage over a `RemoteClient`.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use super::{FetchOutput, Fetcher, StageError, StageResult};
use crate::logging::StageLog;
use crate::models::Batch;
use crate::remote::{remote_join, RemoteClient};

/// Downloads every folder of each remote key into `<output>/<key>/`.
pub struct MirrorFetcher {
    client: Arc<dyn RemoteClient>,
    output_folder: PathBuf,
    /// Restrict the run to these keys (all keys when empty).
    target_folders: Vec<String>,
}

impl MirrorFetcher {
    pub fn new(client: Arc<dyn RemoteClient>, output_folder: impl Into<PathBuf>) -> Self {
        Self {
            client,
            output_folder: output_folder.into(),
            target_folders: Vec::new(),
        }
    }

    pub fn with_target_folders(mut self, targets: Vec<String>) -> Self {
        self.target_folders = targets;
        self
    }

    fn selected_keys(&self) -> StageResult<Vec<String>> {
        let keys = self
            .client
            .list_keys()
            .map_err(|e| StageError::other(format!("Could not list remote folders: {}", e)))?;

        if self.target_folders.is_empty() {
            return Ok(keys);
        }
        for target in &self.target_folders {
            if !keys.contains(target) {
                tracing::warn!("Target folder {} not found in remote", target);
            }
        }
        Ok(keys
            .into_iter()
            .filter(|k| self.target_folders.contains(k))
            .collect())
    }

    /// Download all folders of `key`; returns the number of files fetched.
    fn fetch_key(
        &self,
        key: &str,
        finished: &mut BTreeMap<String, Vec<String>>,
        log: &mut StageLog,
    ) -> usize {
        let folders = match self.client.list_folders(key) {
            Ok(f) => f,
            Err(e) => {
                log.add_error(key, format!("Could not list remote folder {}: {}", key, e));
                return 0;
            }
        };

        let local_dir = self.output_folder.join(key);
        if let Err(e) = fs::create_dir_all(&local_dir) {
            log.add_error(
                key,
                format!("Could not create {}: {}", local_dir.display(), e),
            );
            return 0;
        }

        let mut seen = 0usize;
        let mut fetched = 0usize;
        for folder in &folders {
            let files = match self.client.list_files(folder) {
                Ok(f) => f,
                Err(e) => {
                    log.add_error(key, format!("Could not list {}: {}", folder, e));
                    continue;
                }
            };
            seen += files.len();

            let mut downloaded = Vec::with_capacity(files.len());
            for name in files {
                let remote = remote_join(folder, &name);
                match self.client.download_file(&remote, &local_dir.join(&name)) {
                    Ok(()) => downloaded.push(name),
                    Err(e) => log.add_error(key, format!("Could not download {}: {}", remote, e)),
                }
            }
            fetched += downloaded.len();
            finished.insert(folder.clone(), downloaded);
        }

        if seen == 0 {
            log.add_error(key, format!("No files found in remote folder {}", key));
        } else if fetched > 0 {
            log.set_path(key, &local_dir);
            log.add_info(
                key,
                format!("Downloaded {} of {} files from {} folders", fetched, seen, folders.len()),
            );
        }
        fetched
    }
}

impl Fetcher for MirrorFetcher {
    fn fetch(&self) -> StageResult<FetchOutput> {
        let keys = self.selected_keys()?;
        tracing::info!("Fetching {} remote folders", keys.len());

        let mut output = FetchOutput::default();
        for key in keys {
            self.fetch_key(&key, &mut output.finished_folders, &mut output.log);
            let batch = Batch::from_fetch_log(&key, output.log.unit_mut(&key));
            tracing::debug!("Batch {} fetch status: {}", key, batch.status);
            output.batches.push(batch);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FetchStatus;
    use crate::remote::LocalMirror;
    use std::path::Path;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn merges_subfolders_into_one_batch() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("remote/lab_a/run1/lab_metadata.xlsx"));
        touch(&dir.path().join("remote/lab_a/run2/S1_R1.fastq.gz"));
        fs::create_dir_all(dir.path().join("remote/lab_b")).unwrap();

        let fetcher = MirrorFetcher::new(
            Arc::new(LocalMirror::new(dir.path().join("remote"))),
            dir.path().join("out"),
        );
        let output = fetcher.fetch().unwrap();

        assert_eq!(output.batches.len(), 2);
        let a = &output.batches[0];
        assert_eq!(a.key, "lab_a");
        assert_eq!(a.status, FetchStatus::Succeeded);
        assert!(dir.path().join("out/lab_a/lab_metadata.xlsx").exists());
        assert!(dir.path().join("out/lab_a/S1_R1.fastq.gz").exists());
        assert_eq!(output.finished_folders["lab_a/run1"], vec!["lab_metadata.xlsx"]);
        assert_eq!(output.finished_folders["lab_a/run2"], vec!["S1_R1.fastq.gz"]);

        let b = &output.batches[1];
        assert_eq!(b.status, FetchStatus::Failed);
        assert!(output
            .log
            .unit("lab_b")
            .unwrap()
            .errors
            .contains("No files found in remote folder lab_b"));
    }

    #[test]
    fn target_folders_restrict_keys() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("remote/lab_a/run1/a.txt"));
        touch(&dir.path().join("remote/lab_b/run1/b.txt"));

        let fetcher = MirrorFetcher::new(
            Arc::new(LocalMirror::new(dir.path().join("remote"))),
            dir.path().join("out"),
        )
        .with_target_folders(vec!["lab_b".to_string(), "lab_z".to_string()]);
        let output = fetcher.fetch().unwrap();

        assert_eq!(output.batches.len(), 1);
        assert_eq!(output.batches[0].key, "lab_b");
    }

    #[test]
    fn unreadable_root_is_stage_error() {
        let dir = tempdir().unwrap();
        let fetcher = MirrorFetcher::new(
            Arc::new(LocalMirror::new(dir.path().join("missing"))),
            dir.path().join("out"),
        );
        assert!(fetcher.fetch().is_err());
    }
}
