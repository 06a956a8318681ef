use super::candidate::Candidate;
use crate::executor::{Executor, StateMoveOptions};
use crate::traits::FileSystem;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The canonical state store fragments are consolidated into
pub trait StateStore: Send + Sync {
    /// Whether the canonical store exists yet
    fn exists(&self) -> bool;

    /// Whether the candidate's fragment was produced by the import phase
    fn has_fragment(&self, candidate: &Candidate) -> bool;

    /// Make the candidate's fragment the canonical store
    fn promote(&self, candidate: &Candidate) -> Result<()>;

    /// Move the candidate's resource from its fragment into the canonical
    /// store, backing the store up to `backup` first
    fn merge(&self, candidate: &Candidate, backup: &Path) -> Result<()>;
}

/// State store backed by a terraform state file in the working directory
pub struct FsStateStore {
    fs: Arc<dyn FileSystem>,
    executor: Arc<dyn Executor>,
    working_dir: PathBuf,
    state_file: PathBuf,
}

impl FsStateStore {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        executor: Arc<dyn Executor>,
        working_dir: impl Into<PathBuf>,
        state_file: impl AsRef<Path>,
    ) -> Self {
        let working_dir = working_dir.into();
        let state_file = working_dir.join(state_file);
        Self {
            fs,
            executor,
            working_dir,
            state_file,
        }
    }
}

impl StateStore for FsStateStore {
    fn exists(&self) -> bool {
        self.fs.exists(&self.state_file)
    }

    fn has_fragment(&self, candidate: &Candidate) -> bool {
        self.fs.exists(&candidate.fragment_in(&self.working_dir))
    }

    fn promote(&self, candidate: &Candidate) -> Result<()> {
        let fragment = candidate.fragment_in(&self.working_dir);
        self.fs
            .rename(&fragment, &self.state_file)
            .with_context(|| format!("Failed to promote fragment for {}", candidate.address))
    }

    fn merge(&self, candidate: &Candidate, backup: &Path) -> Result<()> {
        let options = StateMoveOptions {
            state: candidate.fragment_in(&self.working_dir),
            state_out: self.state_file.clone(),
            backup: self.working_dir.join(backup),
            // Consolidation is sequential; nothing else touches the store
            lock: false,
        };
        self.executor
            .state_mv(&candidate.address, &candidate.address, &options)
    }
}

/// In-memory state store for consolidation tests
#[cfg(test)]
pub struct MemoryStateStore {
    inner: std::sync::Mutex<MemoryState>,
}

#[cfg(test)]
#[derive(Default)]
struct MemoryState {
    /// Addresses in the canonical store; `None` until it exists
    store: Option<Vec<String>>,
    fragments: std::collections::HashSet<String>,
    /// Remaining failures per address (`u32::MAX` = always fail)
    merge_failures: std::collections::HashMap<String, u32>,
    promote_failures: std::collections::HashSet<String>,
    merge_attempts: std::collections::HashMap<String, u32>,
    backups: Vec<PathBuf>,
    exists_calls: u32,
    log: Vec<String>,
}

#[cfg(test)]
impl MemoryStateStore {
    pub fn new(existing: Option<Vec<&str>>) -> Self {
        let state = MemoryState {
            store: existing.map(|addresses| addresses.into_iter().map(String::from).collect()),
            ..MemoryState::default()
        };
        Self {
            inner: std::sync::Mutex::new(state),
        }
    }

    pub fn with_fragment(self, candidate: &Candidate) -> Self {
        self.inner
            .lock()
            .unwrap()
            .fragments
            .insert(candidate.fragment_path.clone());
        self
    }

    pub fn failing_merge(self, address: &str, failures: u32) -> Self {
        self.inner
            .lock()
            .unwrap()
            .merge_failures
            .insert(address.to_string(), failures);
        self
    }

    pub fn failing_promote(self, address: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .promote_failures
            .insert(address.to_string());
        self
    }

    pub fn addresses(&self) -> Option<Vec<String>> {
        self.inner.lock().unwrap().store.clone()
    }

    pub fn merge_attempts(&self, address: &str) -> u32 {
        self.inner
            .lock()
            .unwrap()
            .merge_attempts
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    pub fn exists_calls(&self) -> u32 {
        self.inner.lock().unwrap().exists_calls
    }

    pub fn backups(&self) -> Vec<PathBuf> {
        self.inner.lock().unwrap().backups.clone()
    }

    /// Operations in the order they were applied, e.g. "promote a", "merge b"
    pub fn log(&self) -> Vec<String> {
        self.inner.lock().unwrap().log.clone()
    }
}

#[cfg(test)]
impl StateStore for MemoryStateStore {
    fn exists(&self) -> bool {
        let mut state = self.inner.lock().unwrap();
        state.exists_calls += 1;
        state.store.is_some()
    }

    fn has_fragment(&self, candidate: &Candidate) -> bool {
        self.inner
            .lock()
            .unwrap()
            .fragments
            .contains(&candidate.fragment_path)
    }

    fn promote(&self, candidate: &Candidate) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        if state.promote_failures.contains(&candidate.address) {
            anyhow::bail!("permission denied");
        }
        if !state.fragments.remove(&candidate.fragment_path) {
            anyhow::bail!("no fragment {}", candidate.fragment_path);
        }
        state.store = Some(vec![candidate.address.clone()]);
        state.log.push(format!("promote {}", candidate.address));
        Ok(())
    }

    fn merge(&self, candidate: &Candidate, backup: &Path) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        *state
            .merge_attempts
            .entry(candidate.address.clone())
            .or_insert(0) += 1;
        state.backups.push(backup.to_path_buf());

        if let Some(remaining) = state.merge_failures.get_mut(&candidate.address)
            && *remaining > 0
        {
            if *remaining != u32::MAX {
                *remaining -= 1;
            }
            anyhow::bail!("state is locked");
        }

        let Some(store) = state.store.as_mut() else {
            anyhow::bail!("no canonical state to merge into");
        };
        store.push(candidate.address.clone());
        state.fragments.remove(&candidate.fragment_path);
        state.log.push(format!("merge {}", candidate.address));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::MockExecutor;
    use crate::traits::MockFileSystem;

    fn candidate() -> Candidate {
        Candidate::new("aci_rest_managed.a", "fvTenant", "uni/tn-A", ".tmp.tfstate")
    }

    #[test]
    fn test_fs_store_promote_renames_fragment() {
        let fs = Arc::new(MockFileSystem::new());
        let executor = Arc::new(MockExecutor::new(fs.clone()));
        let store = FsStateStore::new(fs.clone(), executor, "/work", "terraform.tfstate");
        let candidate = candidate();
        fs.write(&candidate.fragment_in(Path::new("/work")), "aci_rest_managed.a\n")
            .unwrap();

        assert!(!store.exists());
        assert!(store.has_fragment(&candidate));

        store.promote(&candidate).unwrap();

        assert!(store.exists());
        assert!(!store.has_fragment(&candidate));
        assert_eq!(
            fs.get_file_contents(Path::new("/work/terraform.tfstate")),
            Some("aci_rest_managed.a\n".to_string())
        );
    }

    #[test]
    fn test_fs_store_merge_moves_address_with_backup() {
        let fs = Arc::new(MockFileSystem::new());
        let executor = Arc::new(MockExecutor::new(fs.clone()));
        let store = FsStateStore::new(fs.clone(), executor.clone(), "/work", "terraform.tfstate");
        let candidate = candidate();
        fs.write(Path::new("/work/terraform.tfstate"), "aci_rest_managed.z\n")
            .unwrap();
        fs.write(&candidate.fragment_in(Path::new("/work")), "aci_rest_managed.a\n")
            .unwrap();

        store
            .merge(&candidate, Path::new("aac-import.tmp.tfstate.backup"))
            .unwrap();

        assert_eq!(
            fs.get_file_contents(Path::new("/work/terraform.tfstate")),
            Some("aci_rest_managed.z\naci_rest_managed.a\n".to_string())
        );
        assert_eq!(
            fs.get_file_contents(Path::new("/work/aac-import.tmp.tfstate.backup")),
            Some("aci_rest_managed.z\n".to_string())
        );
        let moves = executor.moves();
        assert_eq!(moves.len(), 1);
        assert!(!moves[0].lock);
    }

    #[test]
    fn test_fs_store_promote_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let fs: Arc<dyn FileSystem> = Arc::new(crate::traits::RealFileSystem);
        let executor = Arc::new(MockExecutor::new(Arc::new(MockFileSystem::new())));
        let store = FsStateStore::new(fs, executor, dir.path(), "terraform.tfstate");
        let candidate = candidate();
        let fragment = candidate.fragment_in(dir.path());
        std::fs::write(&fragment, r#"{"version":4}"#).unwrap();

        store.promote(&candidate).unwrap();

        assert!(!fragment.exists());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("terraform.tfstate")).unwrap(),
            r#"{"version":4}"#
        );
    }
}
