//! `RemoteClient` over a mounted drop-off directory.

use std::fs;
use std::path::{Component, Path, PathBuf};

use super::{remote_join, RemoteClient, RemoteError, RemoteResult};

/// Drop-off laid out as `root/<key>/<subfolder>/<files>`.
#[derive(Debug, Clone)]
pub struct LocalMirror {
    root: PathBuf,
}

impl LocalMirror {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a remote path to a filesystem path under the root.
    fn resolve(&self, remote: &str) -> RemoteResult<PathBuf> {
        let relative = Path::new(remote.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(RemoteError::NotFound(remote.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn read_dir_sorted(&self, dir: &Path, operation: &str) -> RemoteResult<Vec<fs::DirEntry>> {
        if !dir.is_dir() {
            return Err(RemoteError::NotFound(dir.display().to_string()));
        }
        let mut entries = fs::read_dir(dir)
            .and_then(|rd| rd.collect::<Result<Vec<_>, _>>())
            .map_err(|e| RemoteError::io(operation, e))?;
        entries.sort_by_key(|e| e.file_name());
        Ok(entries)
    }

    fn has_files(dir: &Path) -> bool {
        fs::read_dir(dir)
            .map(|rd| rd.flatten().any(|e| e.path().is_file()))
            .unwrap_or(false)
    }

    fn collect_folders(&self, dir: &Path, remote: &str, out: &mut Vec<String>) -> RemoteResult<()> {
        if Self::has_files(dir) {
            out.push(remote.to_string());
        }
        for entry in self.read_dir_sorted(dir, "list folders")? {
            let path = entry.path();
            if path.is_dir() {
                let name = entry.file_name().to_string_lossy().to_string();
                self.collect_folders(&path, &remote_join(remote, &name), out)?;
            }
        }
        Ok(())
    }

    /// Remove empty directories below `dir` (depth first).
    fn prune(dir: &Path) -> RemoteResult<()> {
        let entries = fs::read_dir(dir).map_err(|e| RemoteError::io("clean folders", e))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                Self::prune(&path)?;
                if Self::is_empty_dir(&path) {
                    fs::remove_dir(&path).map_err(|e| RemoteError::io("clean folders", e))?;
                    tracing::debug!("Removed empty remote folder {}", path.display());
                }
            }
        }
        Ok(())
    }

    fn is_empty_dir(dir: &Path) -> bool {
        fs::read_dir(dir)
            .map(|mut rd| rd.next().is_none())
            .unwrap_or(false)
    }
}

impl RemoteClient for LocalMirror {
    fn list_keys(&self) -> RemoteResult<Vec<String>> {
        Ok(self
            .read_dir_sorted(&self.root, "list keys")?
            .into_iter()
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect())
    }

    fn list_folders(&self, key: &str) -> RemoteResult<Vec<String>> {
        let dir = self.resolve(key)?;
        let mut folders = Vec::new();
        self.collect_folders(&dir, key, &mut folders)?;
        Ok(folders)
    }

    fn list_files(&self, dir: &str) -> RemoteResult<Vec<String>> {
        let path = self.resolve(dir)?;
        Ok(self
            .read_dir_sorted(&path, "list files")?
            .into_iter()
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect())
    }

    fn download_file(&self, remote: &str, local: &Path) -> RemoteResult<()> {
        let source = self.resolve(remote)?;
        if !source.is_file() {
            return Err(RemoteError::NotFound(remote.to_string()));
        }
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).map_err(|e| RemoteError::io("download", e))?;
        }
        fs::copy(&source, local).map_err(|e| RemoteError::io("download", e))?;
        Ok(())
    }

    fn upload_file(&self, local: &Path, remote: &str) -> bool {
        let target = match self.resolve(remote) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("Rejected upload target {}: {}", remote, e);
                return false;
            }
        };
        let result = target
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| fs::copy(local, &target));
        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Upload of {} to {} failed: {}", local.display(), remote, e);
                false
            }
        }
    }

    fn delete_files(&self, dir: &str, names: &[String]) -> RemoteResult<Vec<String>> {
        let base = self.resolve(dir)?;
        let mut deleted = Vec::new();
        for name in names {
            let path = base.join(name);
            if !path.is_file() {
                continue;
            }
            fs::remove_file(&path).map_err(|e| RemoteError::io("delete", e))?;
            deleted.push(name.clone());
        }
        Ok(deleted)
    }

    fn clean_empty_folders(&self, key: &str) -> RemoteResult<()> {
        let dir = self.resolve(key)?;
        if !dir.is_dir() {
            return Ok(());
        }
        Self::prune(&dir)?;
        if Self::is_empty_dir(&dir) {
            fs::remove_dir(&dir).map_err(|e| RemoteError::io("clean folders", e))?;
        }
        Ok(())
    }
}
