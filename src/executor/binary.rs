//! Locating a terraform binary that satisfies the version constraint, and
//! installing a pinned release when none is found

use super::executor::Executor;
use super::terraform::TerraformExecutor;
use crate::traits::CommandExecutor;
use anyhow::{Context, Result};
use semver::{Version, VersionReq};
use std::ffi::OsString;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const RELEASES_URL: &str = "https://releases.hashicorp.com/terraform";

fn binary_name() -> &'static str {
    if cfg!(windows) {
        "terraform.exe"
    } else {
        "terraform"
    }
}

/// Search `path_var` (a PATH-style list) for a terraform binary whose version
/// satisfies `constraint`. The first match wins.
pub fn find_binary(
    command: &Arc<dyn CommandExecutor>,
    working_dir: &Path,
    constraint: &VersionReq,
    path_var: Option<OsString>,
) -> Result<PathBuf> {
    let path_var = path_var.context("PATH is not set")?;
    let mut rejected = Vec::new();

    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(binary_name());
        if !candidate.is_file() {
            continue;
        }

        let executor = TerraformExecutor::new(&candidate, working_dir, Arc::clone(command));
        match executor.version() {
            Ok(version) if constraint.matches(&version) => {
                tracing::debug!(path = %candidate.display(), %version, "found terraform");
                return Ok(candidate);
            }
            Ok(version) => rejected.push(format!("{} ({})", candidate.display(), version)),
            Err(err) => {
                tracing::debug!(path = %candidate.display(), error = %format!("{:#}", err), "skipping terraform candidate");
                rejected.push(format!("{} ({:#})", candidate.display(), err));
            }
        }
    }

    if rejected.is_empty() {
        anyhow::bail!("terraform not found in PATH");
    }
    anyhow::bail!(
        "no terraform in PATH satisfies {}; found {}",
        constraint,
        rejected.join(", ")
    )
}

/// Release archive URL for `version` on the current platform
pub fn release_url(version: &Version) -> Result<String> {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        os @ ("linux" | "windows" | "freebsd" | "openbsd" | "solaris") => os,
        other => anyhow::bail!("No terraform release for operating system {}", other),
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "arm" => "arm",
        other => anyhow::bail!("No terraform release for architecture {}", other),
    };

    Ok(format!(
        "{base}/{v}/terraform_{v}_{os}_{arch}.zip",
        base = RELEASES_URL,
        v = version
    ))
}

/// Download and unpack terraform `version` into `install_root/<version>/`,
/// reusing a previous install when present
pub fn install_binary(version: &Version, install_root: &Path) -> Result<PathBuf> {
    let target_dir = install_root.join(version.to_string());
    let target = target_dir.join(binary_name());
    if target.is_file() {
        tracing::info!(path = %target.display(), "reusing installed terraform");
        return Ok(target);
    }

    let url = release_url(version)?;
    tracing::info!(%url, "downloading terraform");
    let archive = reqwest::blocking::get(&url)
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.bytes())
        .with_context(|| format!("Failed to download {}", url))?;

    std::fs::create_dir_all(&target_dir)
        .with_context(|| format!("Failed to create directory: {:?}", target_dir))?;
    extract_binary(&archive, &target)?;

    Ok(target)
}

/// Default install location: the per-user cache directory
pub fn default_install_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("aac-import")
        .join("terraform")
}

fn extract_binary(archive: &[u8], target: &Path) -> Result<()> {
    let mut zip =
        zip::ZipArchive::new(Cursor::new(archive)).context("Release archive is not a zip file")?;
    let mut entry = zip
        .by_name(binary_name())
        .with_context(|| format!("Release archive does not contain {}", binary_name()))?;

    // Write next to the target and rename so a partial download is never picked up
    let partial = target.with_extension("partial");
    let mut file = std::fs::File::create(&partial)
        .with_context(|| format!("Failed to create file: {:?}", partial))?;
    std::io::copy(&mut entry, &mut file).context("Failed to unpack terraform")?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&partial, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("Failed to mark {:?} executable", partial))?;
    }

    std::fs::rename(&partial, target)
        .with_context(|| format!("Failed to rename {:?} to {:?}", partial, target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{MockCommandExecutor, MockCommandResult};
    use std::io::Write;

    fn fake_binary(dir: &Path) -> PathBuf {
        let path = dir.join(binary_name());
        std::fs::write(&path, "").unwrap();
        path
    }

    fn version_json(version: &str) -> String {
        format!(r#"{{"terraform_version":"{}"}}"#, version)
    }

    #[test]
    fn test_find_binary_accepts_matching_version() {
        let dir = tempfile::tempdir().unwrap();
        let expected = fake_binary(dir.path());
        let command: Arc<dyn CommandExecutor> = Arc::new(MockCommandExecutor::with_outputs(vec![
            MockCommandResult::ok(&expected.to_string_lossy(), &version_json("1.5.7")),
        ]));

        let found = find_binary(
            &command,
            dir.path(),
            &VersionReq::parse(">=1.3").unwrap(),
            Some(dir.path().as_os_str().to_owned()),
        )
        .unwrap();

        assert_eq!(found, expected);
    }

    #[test]
    fn test_find_binary_rejects_old_version() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_binary(dir.path());
        let command: Arc<dyn CommandExecutor> = Arc::new(MockCommandExecutor::with_outputs(vec![
            MockCommandResult::ok(&binary.to_string_lossy(), &version_json("1.2.9")),
        ]));

        let err = find_binary(
            &command,
            dir.path(),
            &VersionReq::parse(">=1.3").unwrap(),
            Some(dir.path().as_os_str().to_owned()),
        )
        .unwrap_err();

        assert!(err.to_string().contains("1.2.9"));
    }

    #[test]
    fn test_find_binary_reports_unreadable_version() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_binary(dir.path());
        let command: Arc<dyn CommandExecutor> = Arc::new(MockCommandExecutor::with_outputs(vec![
            MockCommandResult::ok(&binary.to_string_lossy(), "not json"),
        ]));

        let err = find_binary(
            &command,
            dir.path(),
            &VersionReq::parse(">=1.3").unwrap(),
            Some(dir.path().as_os_str().to_owned()),
        )
        .unwrap_err();

        let message = err.to_string();
        assert!(!message.contains("not found"));
        assert!(message.contains(&binary.display().to_string()));
        assert!(message.contains("Failed to parse terraform version output"));
    }

    #[test]
    fn test_find_binary_skips_directories_without_terraform() {
        let empty = tempfile::tempdir().unwrap();
        let command: Arc<dyn CommandExecutor> = Arc::new(MockCommandExecutor::new());

        let err = find_binary(
            &command,
            empty.path(),
            &VersionReq::parse(">=1.3").unwrap(),
            Some(empty.path().as_os_str().to_owned()),
        )
        .unwrap_err();

        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_release_url_shape() {
        let url = release_url(&Version::new(1, 3, 6)).unwrap();
        assert!(url.starts_with("https://releases.hashicorp.com/terraform/1.3.6/terraform_1.3.6_"));
        assert!(url.ends_with(".zip"));
    }

    #[test]
    fn test_extract_binary_from_archive() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            writer
                .start_file(binary_name(), zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"#!/bin/sh\n").unwrap();
            writer.finish().unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join(binary_name());
        extract_binary(buffer.get_ref(), &target).unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"#!/bin/sh\n");
    }

    #[test]
    fn test_install_reuses_existing_binary() {
        let root = tempfile::tempdir().unwrap();
        let version = Version::new(1, 3, 6);
        let existing = root.path().join("1.3.6").join(binary_name());
        std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
        std::fs::write(&existing, "").unwrap();

        assert_eq!(install_binary(&version, root.path()).unwrap(), existing);
    }
}
