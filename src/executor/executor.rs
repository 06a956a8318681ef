use super::plan::Plan;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Options for importing one resource into a state file
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// State file the imported resource is written to
    pub state_out: PathBuf,
    /// Whether terraform should take its state lock
    pub lock: bool,
}

/// Options for moving one resource between state files
#[derive(Debug, Clone)]
pub struct StateMoveOptions {
    /// State file the resource is read from
    pub state: PathBuf,
    /// State file the resource is written to
    pub state_out: PathBuf,
    /// Backup written before the destination state is modified
    pub backup: PathBuf,
    pub lock: bool,
}

/// Trait for the provisioning tool the import pipeline drives (terraform)
///
/// Implementations are shared across import workers, so every method must be
/// safe to call concurrently.
pub trait Executor: Send + Sync {
    /// Check if the executor is installed and available
    fn check_installed(&self) -> Result<bool>;

    /// Report the version of the installed tool
    fn version(&self) -> Result<semver::Version>;

    /// Initialize the working directory (`terraform init`)
    fn init(&self) -> Result<()>;

    /// Compute a plan and save it to `out`; returns whether the plan has changes
    fn plan(&self, out: &Path) -> Result<bool>;

    /// Read a saved plan file as structured data
    fn show_plan(&self, plan_file: &Path) -> Result<Plan>;

    /// Import the backend object `id` as `address`
    fn import(&self, address: &str, id: &str, options: &ImportOptions) -> Result<()>;

    /// Move `source` to `destination` between state files
    fn state_mv(&self, source: &str, destination: &str, options: &StateMoveOptions)
    -> Result<()>;

    /// Get the name of this executor (e.g., "terraform")
    fn get_name(&self) -> &str;
}
