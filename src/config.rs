//! Run configuration
//!
//! Defaults reproduce the stock ACI-as-Code layout. An optional
//! `.aac-import.yaml` in the working directory overrides them, and CLI flags
//! override the file.

use crate::import::RetryPolicy;
use crate::traits::FileSystem;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Name of the optional configuration file looked up in the working directory
pub const CONFIG_FILE: &str = ".aac-import.yaml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportConfig {
    /// Canonical state store, relative to the working directory
    pub state_file: String,

    /// Saved plan file
    pub plan_file: String,

    /// Backup written by every merge into the canonical state
    pub backup_file: String,

    /// Holding directory for run artifacts when cleanup is disabled
    pub cleanup_dir: String,

    /// Debug log written next to the configuration
    pub log_file: String,

    /// Suffix appended to sanitized ids to name state fragments
    pub fragment_suffix: String,

    /// Resource type whose planned creates are imported
    pub resource_type: String,

    /// Concurrent import workers
    pub workers: usize,

    /// Acceptable terraform versions for an existing install
    pub version_constraint: String,

    /// Version installed with `--install`
    pub install_version: String,

    /// Retry policy for each import (rides out backend throttling)
    pub import_retry: RetryPolicy,

    /// Retry policy for each state merge (local, so no delay)
    pub merge_retry: RetryPolicy,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            state_file: "terraform.tfstate".to_string(),
            plan_file: "aac-import.tfplan".to_string(),
            backup_file: "aac-import.tmp.tfstate.backup".to_string(),
            cleanup_dir: "aac-import-files".to_string(),
            log_file: "aac-import.log".to_string(),
            fragment_suffix: ".tmp.tfstate".to_string(),
            resource_type: "aci_rest_managed".to_string(),
            workers: 10,
            version_constraint: ">=1.3".to_string(),
            install_version: "1.3.6".to_string(),
            import_retry: RetryPolicy::fixed(3, Duration::from_secs(1)),
            merge_retry: RetryPolicy::immediate(3),
        }
    }
}

impl ImportConfig {
    /// Load configuration for `working_dir`.
    ///
    /// An explicit `path` must exist; otherwise `.aac-import.yaml` is used when
    /// present and the defaults when not.
    pub fn load(fs: &dyn FileSystem, working_dir: &Path, path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (working_dir.join(path), true),
            None => (working_dir.join(CONFIG_FILE), false),
        };

        if !fs.exists(&path) {
            if required {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            return Ok(Self::default());
        }

        let content = fs.read_to_string(&path)?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }
        if self.workers > Semaphore::MAX_PERMITS {
            anyhow::bail!(
                "workers must be at most {}, got {}",
                Semaphore::MAX_PERMITS,
                self.workers
            );
        }
        self.version_req()?;
        self.install_version()?;
        Ok(())
    }

    pub fn version_req(&self) -> Result<semver::VersionReq> {
        semver::VersionReq::parse(&self.version_constraint)
            .with_context(|| format!("Invalid version constraint: {}", self.version_constraint))
    }

    pub fn install_version(&self) -> Result<semver::Version> {
        semver::Version::parse(&self.install_version)
            .with_context(|| format!("Invalid install version: {}", self.install_version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MockFileSystem;

    #[test]
    fn test_defaults_match_stock_layout() {
        let config = ImportConfig::default();

        assert_eq!(config.state_file, "terraform.tfstate");
        assert_eq!(config.workers, 10);
        assert_eq!(config.import_retry.max_attempts, 3);
        assert_eq!(config.import_retry.delay(), Duration::from_secs(1));
        assert_eq!(config.merge_retry.max_attempts, 3);
        assert_eq!(config.merge_retry.delay(), Duration::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let fs = MockFileSystem::new();
        let config = ImportConfig::load(&fs, Path::new("/work"), None).unwrap();
        assert_eq!(config, ImportConfig::default());
    }

    #[test]
    fn test_load_overlays_file_on_defaults() {
        let fs = MockFileSystem::new();
        fs.write(
            Path::new("/work/.aac-import.yaml"),
            "workers: 4\nresource_type: aci_rest\nmerge_retry:\n  max_attempts: 5\n",
        )
        .unwrap();

        let config = ImportConfig::load(&fs, Path::new("/work"), None).unwrap();

        assert_eq!(config.workers, 4);
        assert_eq!(config.resource_type, "aci_rest");
        assert_eq!(config.merge_retry, RetryPolicy::immediate(5));
        assert_eq!(config.state_file, "terraform.tfstate");
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let fs = MockFileSystem::new();
        let result = ImportConfig::load(&fs, Path::new("/work"), Some(Path::new("custom.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_unknown_keys_and_zero_workers() {
        let fs = MockFileSystem::new();
        fs.write(Path::new("/work/.aac-import.yaml"), "wokers: 4\n").unwrap();
        assert!(ImportConfig::load(&fs, Path::new("/work"), None).is_err());

        fs.write(Path::new("/work/.aac-import.yaml"), "workers: 0\n").unwrap();
        assert!(ImportConfig::load(&fs, Path::new("/work"), None).is_err());
    }

    #[test]
    fn test_rejects_worker_count_above_permit_limit() {
        let config = ImportConfig {
            workers: usize::MAX,
            ..ImportConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at most"));

        let config = ImportConfig {
            workers: Semaphore::MAX_PERMITS,
            ..ImportConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_invalid_version_constraint() {
        let config = ImportConfig {
            version_constraint: "not a version".to_string(),
            ..ImportConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
