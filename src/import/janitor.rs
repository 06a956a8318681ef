//! Workspace cleanup
//!
//! Everything a run leaves in the working directory that was not there before
//! it started is either deleted or moved into a holding directory. The
//! canonical state file is the one exception.

use crate::traits::FileSystem;
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Names present in the working directory when the run started
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceSnapshot {
    entries: BTreeSet<String>,
}

impl WorkspaceSnapshot {
    pub fn capture(fs: &dyn FileSystem, dir: &Path) -> Result<Self> {
        let entries = fs
            .read_dir(dir)
            .with_context(|| format!("Failed to list working directory: {}", dir.display()))?
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();

        Ok(Self { entries })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupPolicy {
    Delete,
    /// Keep artifacts in this directory (relative to the working directory)
    Move(PathBuf),
}

pub struct WorkspaceJanitor {
    fs: Arc<dyn FileSystem>,
    working_dir: PathBuf,
    snapshot: WorkspaceSnapshot,
    policy: CleanupPolicy,
    /// Entries never touched by cleanup, such as the canonical state file
    preserved: Vec<String>,
}

impl WorkspaceJanitor {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        working_dir: impl Into<PathBuf>,
        snapshot: WorkspaceSnapshot,
        policy: CleanupPolicy,
        preserved: Vec<String>,
    ) -> Self {
        Self {
            fs,
            working_dir: working_dir.into(),
            snapshot,
            policy,
            preserved,
        }
    }

    /// Remove or relocate every entry created since the snapshot.
    ///
    /// Returns the names handled. A failure on one entry is logged and the
    /// rest are still processed.
    pub fn cleanup(&self) -> Result<Vec<String>> {
        let holding = match &self.policy {
            CleanupPolicy::Delete => None,
            CleanupPolicy::Move(dir) => {
                let dir = self.working_dir.join(dir);
                self.fs.create_dir_all(&dir).with_context(|| {
                    format!("Failed to create holding directory: {}", dir.display())
                })?;
                Some(dir)
            }
        };

        let mut handled = Vec::new();
        for path in self.fs.read_dir(&self.working_dir)? {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };

            if self.snapshot.contains(&name) || self.preserved.contains(&name) {
                continue;
            }
            if holding.as_deref() == Some(path.as_path()) {
                continue;
            }

            let result = match &holding {
                None => self.remove(&path),
                Some(dir) => self.fs.rename(&path, &dir.join(&name)),
            };

            match result {
                Ok(()) => {
                    tracing::debug!(entry = %name, "cleaned up");
                    handled.push(name);
                }
                Err(err) => {
                    tracing::warn!(entry = %name, error = %format!("{:#}", err), "could not clean up")
                }
            }
        }

        Ok(handled)
    }

    fn remove(&self, path: &Path) -> Result<()> {
        if self.fs.is_dir(path) {
            self.fs.remove_dir_all(path)
        } else {
            self.fs.remove_file(path)
        }
    }
}

/// Runs cleanup when dropped, so every exit path from a run tidies up
pub struct CleanupGuard {
    janitor: Option<WorkspaceJanitor>,
}

impl CleanupGuard {
    pub fn new(janitor: WorkspaceJanitor) -> Self {
        Self {
            janitor: Some(janitor),
        }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let Some(janitor) = self.janitor.take() else {
            return;
        };
        match janitor.cleanup() {
            Ok(handled) => tracing::debug!(count = handled.len(), "workspace cleanup finished"),
            Err(err) => tracing::warn!(error = %format!("{:#}", err), "workspace cleanup failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{MockFileSystem, RealFileSystem};
    use tempfile::TempDir;

    fn preserved() -> Vec<String> {
        vec!["terraform.tfstate".to_string()]
    }

    #[test]
    fn test_deletes_new_entries_and_keeps_preexisting_ones() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        std::fs::write(dir.join("main.tf"), "").unwrap();
        std::fs::create_dir(dir.join(".terraform")).unwrap();

        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let snapshot = WorkspaceSnapshot::capture(&*fs, dir).unwrap();
        assert!(snapshot.contains("main.tf"));
        assert!(snapshot.contains(".terraform"));

        std::fs::write(dir.join("aac-import.tfplan"), "plan").unwrap();
        std::fs::write(dir.join("fvTenant_uni_tn-A.tmp.tfstate"), "{}").unwrap();
        std::fs::write(dir.join("terraform.tfstate"), "{}").unwrap();
        std::fs::create_dir(dir.join("scratch")).unwrap();
        std::fs::write(dir.join("scratch/inner"), "").unwrap();

        let janitor =
            WorkspaceJanitor::new(fs, dir, snapshot, CleanupPolicy::Delete, preserved());
        let mut handled = janitor.cleanup().unwrap();
        handled.sort();

        assert_eq!(
            handled,
            vec!["aac-import.tfplan", "fvTenant_uni_tn-A.tmp.tfstate", "scratch"]
        );
        assert!(dir.join("main.tf").exists());
        assert!(dir.join(".terraform").is_dir());
        assert!(dir.join("terraform.tfstate").exists());
        assert!(!dir.join("scratch").exists());
    }

    #[test]
    fn test_move_policy_relocates_into_holding_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let snapshot = WorkspaceSnapshot::capture(&*fs, dir).unwrap();

        std::fs::write(dir.join("aac-import.tfplan"), "plan").unwrap();
        std::fs::write(dir.join("terraform.tfstate"), "{}").unwrap();

        let janitor = WorkspaceJanitor::new(
            fs,
            dir,
            snapshot,
            CleanupPolicy::Move(PathBuf::from("aac-import-files")),
            preserved(),
        );
        let handled = janitor.cleanup().unwrap();

        assert_eq!(handled, vec!["aac-import.tfplan"]);
        assert_eq!(
            std::fs::read_to_string(dir.join("aac-import-files/aac-import.tfplan")).unwrap(),
            "plan"
        );
        assert!(dir.join("terraform.tfstate").exists());
        assert!(!dir.join("aac-import.tfplan").exists());
    }

    #[test]
    fn test_existing_holding_directory_is_reused() {
        let fs = Arc::new(MockFileSystem::new());
        let dir = Path::new("/work");
        fs.create_dir_all(&dir.join("aac-import-files")).unwrap();
        fs.write(&dir.join("aac-import-files/old.tfplan"), "old").unwrap();
        let snapshot = WorkspaceSnapshot::capture(&*fs, dir).unwrap();

        fs.write(&dir.join("new.tmp.tfstate"), "{}").unwrap();

        let janitor = WorkspaceJanitor::new(
            fs.clone(),
            dir,
            snapshot,
            CleanupPolicy::Move(PathBuf::from("aac-import-files")),
            preserved(),
        );
        janitor.cleanup().unwrap();

        assert!(fs.has_file(&dir.join("aac-import-files/old.tfplan")));
        assert!(fs.has_file(&dir.join("aac-import-files/new.tmp.tfstate")));
    }

    #[test]
    fn test_guard_cleans_up_on_drop() {
        let fs = Arc::new(MockFileSystem::new());
        let dir = Path::new("/work");
        fs.write(&dir.join("main.tf"), "").unwrap();
        let snapshot = WorkspaceSnapshot::capture(&*fs, dir).unwrap();

        {
            let _guard = CleanupGuard::new(WorkspaceJanitor::new(
                fs.clone(),
                dir,
                snapshot,
                CleanupPolicy::Delete,
                preserved(),
            ));
            fs.write(&dir.join("aac-import.tfplan"), "plan").unwrap();
        }

        assert!(!fs.has_file(&dir.join("aac-import.tfplan")));
        assert!(fs.has_file(&dir.join("main.tf")));
    }

    #[test]
    fn test_capture_fails_for_missing_directory() {
        let fs = MockFileSystem::new();
        assert!(WorkspaceSnapshot::capture(&fs, Path::new("/missing")).is_err());
    }
}
