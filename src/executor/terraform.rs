use super::executor::{Executor, ImportOptions, StateMoveOptions};
use super::plan::Plan;
use crate::traits::CommandExecutor;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;

/// Terraform executor implementation driving the terraform binary
pub struct TerraformExecutor {
    binary: PathBuf,
    working_dir: PathBuf,
    command: Arc<dyn CommandExecutor>,
}

/// Subset of `terraform version -json`
#[derive(Debug, Deserialize)]
struct VersionOutput {
    terraform_version: String,
}

impl TerraformExecutor {
    pub fn new(
        binary: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
        command: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self {
            binary: binary.into(),
            working_dir: working_dir.into(),
            command,
        }
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        let binary = self.binary.to_string_lossy();
        tracing::debug!(binary = %binary, args = ?args, "running terraform");
        self.command.execute(&binary, args, &self.working_dir)
    }

    fn expect_success(subcommand: &str, output: Output) -> Result<Output> {
        if output.status.success() {
            return Ok(output);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "terraform {} exited with {}: {}",
            subcommand,
            output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            stderr.trim()
        )
    }
}

/// Parse the JSON printed by `terraform version -json`
pub fn parse_version_output(stdout: &[u8]) -> Result<semver::Version> {
    let parsed: VersionOutput =
        serde_json::from_slice(stdout).context("Failed to parse terraform version output")?;
    semver::Version::parse(&parsed.terraform_version)
        .with_context(|| format!("Invalid terraform version: {}", parsed.terraform_version))
}

fn flag(name: &str, path: &Path) -> String {
    format!("-{}={}", name, path.display())
}

impl Executor for TerraformExecutor {
    fn check_installed(&self) -> Result<bool> {
        match self.run(&["version", "-json"]) {
            Ok(output) => Ok(output.status.success()),
            Err(_) => Ok(false), // Command not found or failed to execute
        }
    }

    fn version(&self) -> Result<semver::Version> {
        let output = self.run(&["version", "-json"])?;
        let output = Self::expect_success("version", output)?;
        parse_version_output(&output.stdout)
    }

    fn init(&self) -> Result<()> {
        let output = self
            .run(&["init", "-no-color", "-input=false"])
            .context("Failed to execute terraform init")?;
        Self::expect_success("init", output)?;
        Ok(())
    }

    fn plan(&self, out: &Path) -> Result<bool> {
        let out = flag("out", out);
        let output = self
            .run(&[
                "plan",
                "-no-color",
                "-input=false",
                "-detailed-exitcode",
                &out,
            ])
            .context("Failed to execute terraform plan")?;

        // -detailed-exitcode: 0 = no changes, 1 = error, 2 = changes present
        match output.status.code() {
            Some(0) => Ok(false),
            Some(2) => Ok(true),
            _ => Self::expect_success("plan", output).map(|_| false),
        }
    }

    fn show_plan(&self, plan_file: &Path) -> Result<Plan> {
        let plan_file = plan_file.to_string_lossy();
        let output = self
            .run(&["show", "-json", "-no-color", &plan_file])
            .context("Failed to execute terraform show")?;
        let output = Self::expect_success("show", output)?;

        serde_json::from_slice(&output.stdout).context("Failed to parse terraform plan JSON")
    }

    fn import(&self, address: &str, id: &str, options: &ImportOptions) -> Result<()> {
        let state_out = flag("state-out", &options.state_out);
        let lock = format!("-lock={}", options.lock);
        let output = self
            .run(&[
                "import",
                "-no-color",
                "-input=false",
                &lock,
                &state_out,
                address,
                id,
            ])
            .with_context(|| format!("Failed to execute terraform import for {}", address))?;
        Self::expect_success("import", output)?;
        Ok(())
    }

    fn state_mv(
        &self,
        source: &str,
        destination: &str,
        options: &StateMoveOptions,
    ) -> Result<()> {
        let state = flag("state", &options.state);
        let state_out = flag("state-out", &options.state_out);
        let backup = flag("backup", &options.backup);
        let lock = format!("-lock={}", options.lock);
        let output = self
            .run(&[
                "state",
                "mv",
                "-no-color",
                &lock,
                &state,
                &state_out,
                &backup,
                source,
                destination,
            ])
            .with_context(|| format!("Failed to execute terraform state mv for {}", source))?;
        Self::expect_success("state mv", output)?;
        Ok(())
    }

    fn get_name(&self) -> &str {
        "terraform"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{MockCommandExecutor, MockCommandResult};

    fn executor_with(outputs: Vec<MockCommandResult>) -> (TerraformExecutor, Arc<MockCommandExecutor>) {
        let command = Arc::new(MockCommandExecutor::with_outputs(outputs));
        let executor = TerraformExecutor::new("terraform", "/work", command.clone());
        (executor, command)
    }

    #[test]
    fn test_plan_detailed_exit_codes() {
        let (executor, _) = executor_with(vec![MockCommandResult::exit("terraform plan", 2, "")]);
        assert!(executor.plan(Path::new("/work/aac-import.tfplan")).unwrap());

        let (executor, _) = executor_with(vec![MockCommandResult::exit("terraform plan", 0, "")]);
        assert!(!executor.plan(Path::new("/work/aac-import.tfplan")).unwrap());

        let (executor, _) = executor_with(vec![MockCommandResult::exit(
            "terraform plan",
            1,
            "Error: Invalid provider configuration",
        )]);
        let err = executor
            .plan(Path::new("/work/aac-import.tfplan"))
            .unwrap_err();
        assert!(err.to_string().contains("Invalid provider configuration"));
    }

    #[test]
    fn test_plan_writes_to_plan_file() {
        let (executor, command) = executor_with(vec![]);
        executor.plan(Path::new("/work/aac-import.tfplan")).unwrap();

        assert_eq!(
            command.calls(),
            vec!["terraform plan -no-color -input=false -detailed-exitcode -out=/work/aac-import.tfplan"]
        );
    }

    #[test]
    fn test_show_plan_parses_json() {
        let json = r#"{"resource_changes":[{"address":"aci_rest_managed.a","type":"aci_rest_managed","change":{"actions":["create"],"after":{}}}]}"#;
        let (executor, _) = executor_with(vec![MockCommandResult::ok("terraform show", json)]);

        let plan = executor.show_plan(Path::new("aac-import.tfplan")).unwrap();
        assert_eq!(plan.resource_changes.len(), 1);
    }

    #[test]
    fn test_show_plan_rejects_invalid_json() {
        let (executor, _) = executor_with(vec![MockCommandResult::ok("terraform show", "not json")]);
        assert!(executor.show_plan(Path::new("aac-import.tfplan")).is_err());
    }

    #[test]
    fn test_import_arguments() {
        let (executor, command) = executor_with(vec![]);
        executor
            .import(
                "aci_rest_managed.tenant",
                "fvTenant:uni/tn-ABC",
                &ImportOptions {
                    state_out: PathBuf::from("/work/fvTenant_uni_tn-ABC.tmp.tfstate"),
                    lock: false,
                },
            )
            .unwrap();

        assert_eq!(
            command.calls(),
            vec![
                "terraform import -no-color -input=false -lock=false \
                 -state-out=/work/fvTenant_uni_tn-ABC.tmp.tfstate \
                 aci_rest_managed.tenant fvTenant:uni/tn-ABC"
            ]
        );
    }

    #[test]
    fn test_import_failure_carries_stderr() {
        let (executor, _) = executor_with(vec![MockCommandResult::exit(
            "terraform import",
            1,
            "Error: 429 Too Many Requests",
        )]);

        let err = executor
            .import(
                "aci_rest_managed.tenant",
                "fvTenant:uni/tn-ABC",
                &ImportOptions {
                    state_out: PathBuf::from("fragment.tmp.tfstate"),
                    lock: false,
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("429 Too Many Requests"));
    }

    #[test]
    fn test_state_mv_arguments() {
        let (executor, command) = executor_with(vec![]);
        executor
            .state_mv(
                "aci_rest_managed.tenant",
                "aci_rest_managed.tenant",
                &StateMoveOptions {
                    state: PathBuf::from("/work/a.tmp.tfstate"),
                    state_out: PathBuf::from("/work/terraform.tfstate"),
                    backup: PathBuf::from("/work/aac-import.tmp.tfstate.backup"),
                    lock: false,
                },
            )
            .unwrap();

        assert_eq!(
            command.calls(),
            vec![
                "terraform state mv -no-color -lock=false -state=/work/a.tmp.tfstate \
                 -state-out=/work/terraform.tfstate -backup=/work/aac-import.tmp.tfstate.backup \
                 aci_rest_managed.tenant aci_rest_managed.tenant"
            ]
        );
    }

    #[test]
    fn test_version_parsing() {
        let (executor, _) = executor_with(vec![MockCommandResult::ok(
            "terraform version",
            r#"{"terraform_version":"1.3.6","platform":"linux_amd64","provider_selections":{},"terraform_outdated":true}"#,
        )]);

        assert_eq!(executor.version().unwrap(), semver::Version::new(1, 3, 6));
        assert_eq!(executor.get_name(), "terraform");
    }

    #[test]
    fn test_check_installed_reports_failure() {
        let (executor, _) =
            executor_with(vec![MockCommandResult::exit("terraform version", 127, "")]);
        assert!(!executor.check_installed().unwrap());
    }
}
