use crate::traits::{
    CommandExecutor, FileSystem, Output, RealCommandExecutor, RealFileSystem, TerminalOutput,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Application context that holds the working directory and every injected
/// collaborator, so no component reaches for process-wide state
pub struct Context {
    pub fs: Arc<dyn FileSystem>,
    pub output: Arc<dyn Output>,
    pub command: Arc<dyn CommandExecutor>,
    /// Directory holding the terraform configuration; every run artifact lands here
    pub working_dir: PathBuf,
}

impl Context {
    /// Create a new context with real implementations (for production use)
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            fs: Arc::new(RealFileSystem),
            output: Arc::new(TerminalOutput),
            command: Arc::new(RealCommandExecutor::new()),
            working_dir: working_dir.into(),
        }
    }

    /// Create a test context with specific mock implementations
    #[cfg(test)]
    pub fn test_with(
        fs: Arc<dyn FileSystem>,
        output: Arc<dyn Output>,
        command: Arc<dyn CommandExecutor>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fs,
            output,
            command,
            working_dir: working_dir.into(),
        }
    }

    /// Resolve a run artifact name against the working directory
    pub fn path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.working_dir.join(name)
    }
}
