use anyhow::{Context as _, Result};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ImportConfig;
use crate::context::Context;
use crate::executor::binary::{default_install_root, find_binary, install_binary};
use crate::executor::{Executor, TerraformExecutor};
use crate::import::{
    ChangeExtractor, CleanupGuard, CleanupPolicy, FsStateStore, ImportOutcome, ImportScheduler,
    MergeOutcome, MergeReport, StateConsolidator, WorkspaceJanitor, WorkspaceSnapshot,
};

/// Command-line switches for one run
#[derive(Debug, Clone, Default)]
pub struct ImportArgs {
    /// Keep run artifacts in the holding directory instead of deleting them
    pub no_cleanup: bool,
    /// Install terraform when no suitable binary is found
    pub install: bool,
    /// Search path for an existing terraform binary
    pub path_var: Option<OsString>,
}

/// A candidate that did not land in the state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFailure {
    pub address: String,
    /// Pipeline stage that gave up: `import`, `promote` or `merge`
    pub stage: &'static str,
    pub attempts: u32,
    pub error: String,
}

impl CandidateFailure {
    fn describe(&self) -> String {
        let plural = if self.attempts == 1 { "" } else { "s" };
        format!(
            "{}: {} failed after {} attempt{}: {}",
            self.address, self.stage, self.attempts, plural, self.error
        )
    }
}

/// Counts reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub found: usize,
    pub imported: usize,
    pub consolidated: usize,
    pub failures: Vec<CandidateFailure>,
}

impl ImportSummary {
    fn from_outcomes(imports: &[ImportOutcome], merges: &[MergeReport]) -> Self {
        let mut failures: Vec<CandidateFailure> = imports
            .iter()
            .filter_map(|outcome| {
                outcome.error.as_ref().map(|error| CandidateFailure {
                    address: outcome.candidate.address.clone(),
                    stage: "import",
                    attempts: outcome.attempts,
                    error: error.clone(),
                })
            })
            .collect();
        failures.extend(merges.iter().filter_map(|report| {
            let (stage, attempts, error) = match &report.outcome {
                MergeOutcome::PromoteFailed { error } => ("promote", 1, error),
                MergeOutcome::Failed { attempts, error } => ("merge", *attempts, error),
                _ => return None,
            };
            Some(CandidateFailure {
                address: report.address.clone(),
                stage,
                attempts,
                error: error.clone(),
            })
        }));

        Self {
            found: imports.len(),
            imported: imports.iter().filter(|outcome| outcome.succeeded()).count(),
            consolidated: merges.iter().filter(|report| report.landed()).count(),
            failures,
        }
    }
}

/// Import every planned ACI object into the terraform state
pub struct ImportCommand;

impl ImportCommand {
    /// Run the whole pipeline in `ctx.working_dir`.
    ///
    /// Only structural problems (no usable terraform, init, plan or show
    /// failing) are errors. Candidates that fail to import or merge are logged
    /// and listed in the summary. Cleanup runs on every exit path.
    pub fn execute(ctx: &Context, config: &ImportConfig, args: &ImportArgs) -> Result<ImportSummary> {
        let snapshot = WorkspaceSnapshot::capture(&*ctx.fs, &ctx.working_dir)?;
        let policy = if args.no_cleanup {
            CleanupPolicy::Move(PathBuf::from(&config.cleanup_dir))
        } else {
            CleanupPolicy::Delete
        };
        let _cleanup = CleanupGuard::new(WorkspaceJanitor::new(
            Arc::clone(&ctx.fs),
            &ctx.working_dir,
            snapshot,
            policy,
            vec![config.state_file.clone()],
        ));

        let binary = Self::locate_terraform(ctx, config, args)?;
        let executor: Arc<dyn Executor> = Arc::new(TerraformExecutor::new(
            &binary,
            &ctx.working_dir,
            Arc::clone(&ctx.command),
        ));
        if !executor.check_installed()? {
            anyhow::bail!("error accessing terraform binary: {}", binary.display());
        }
        ctx.output.status_check(executor.get_name(), true);

        let summary = Self::run(ctx, config, executor)?;
        Self::print_summary(ctx, &summary);
        Ok(summary)
    }

    fn locate_terraform(ctx: &Context, config: &ImportConfig, args: &ImportArgs) -> Result<PathBuf> {
        tracing::info!("Validating terraform installation");
        let constraint = config.version_req()?;

        match find_binary(&ctx.command, &ctx.working_dir, &constraint, args.path_var.clone()) {
            Ok(binary) => Ok(binary),
            Err(err) if args.install => {
                tracing::warn!(
                    "unable to find a terraform install for version {}: {:#}",
                    constraint,
                    err
                );
                let version = config.install_version()?;
                ctx.output.info(&format!("Installing terraform {}", version));
                install_binary(&version, &default_install_root())
                    .with_context(|| format!("unable to install terraform {}", version))
            }
            Err(err) => Err(err.context(format!(
                "unable to find terraform install for version {} (use --install to download one)",
                constraint
            ))),
        }
    }

    /// Init, plan, import and consolidate with an already located executor
    pub fn run(
        ctx: &Context,
        config: &ImportConfig,
        executor: Arc<dyn Executor>,
    ) -> Result<ImportSummary> {
        tracing::info!("Running {} init", executor.get_name());
        executor.init().context("cannot run terraform init")?;

        tracing::info!("Running {} plan", executor.get_name());
        let plan_file = ctx.path(&config.plan_file);
        if !executor
            .plan(&plan_file)
            .context("cannot run terraform plan")?
        {
            tracing::info!("No changes");
        }

        tracing::info!("Analyzing terraform plan output");
        let plan = executor
            .show_plan(&plan_file)
            .context("cannot show plan file")?;
        tracing::debug!(
            format_version = ?plan.format_version,
            terraform_version = ?plan.terraform_version,
            changes = plan.resource_changes.len(),
            "read plan"
        );
        let candidates = ChangeExtractor::new(&config.resource_type, &config.fragment_suffix)
            .extract(&plan.resource_changes);
        tracing::info!("Found {} importable changes in plan", candidates.len());
        if candidates.is_empty() {
            return Ok(ImportSummary::default());
        }

        // Imports go to separate fragments to avoid state file locks
        tracing::info!("Importing {} objects...", candidates.len());
        let scheduler =
            ImportScheduler::new(Arc::clone(&executor), &ctx.working_dir, config.import_retry);
        let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
        let imports = runtime.block_on(scheduler.run(&candidates, config.workers));

        // Merging is local and must run one fragment at a time
        tracing::info!("Merging state...");
        let store = FsStateStore::new(
            Arc::clone(&ctx.fs),
            executor,
            &ctx.working_dir,
            &config.state_file,
        );
        let merges = StateConsolidator::new(&store, config.merge_retry, &config.backup_file)
            .run(&candidates);

        Ok(ImportSummary::from_outcomes(&imports, &merges))
    }

    fn print_summary(ctx: &Context, summary: &ImportSummary) {
        ctx.output.section("Import summary");
        ctx.output
            .key_value("Importable changes", &summary.found.to_string());
        ctx.output.key_value("Imported", &summary.imported.to_string());
        ctx.output
            .key_value("Added to state", &summary.consolidated.to_string());

        if summary.failures.is_empty() {
            if summary.found == 0 {
                ctx.output.success("Nothing to import");
            } else {
                ctx.output.success("All objects imported");
            }
            return;
        }

        ctx.output.blank();
        for failure in &summary.failures {
            ctx.output.warning(&failure.describe());
        }
        ctx.output.dimmed("See the log file for details");
    }
}
