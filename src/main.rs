mod commands;
mod config;
mod context;
mod executor;
mod import;
mod logging;
mod output;
mod test_helpers;
mod traits;

use anyhow::{Context as _, Result};
use clap::Parser;
use commands::{ImportArgs, ImportCommand};
use config::ImportConfig;
use context::Context;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::LazyLock;
use traits::{Output, TerminalOutput};

/// Release builds set `AAC_IMPORT_COMMIT` and `AAC_IMPORT_BUILD_DATE` at compile time
static VERSION: LazyLock<String> = LazyLock::new(|| {
    format!(
        "{} - commit {} - {}",
        env!("CARGO_PKG_VERSION"),
        option_env!("AAC_IMPORT_COMMIT").unwrap_or("none"),
        option_env!("AAC_IMPORT_BUILD_DATE").unwrap_or("unknown")
    )
});

#[derive(Parser)]
#[command(name = "aac-import")]
#[command(about = "ACI as Code terraform import tool", long_about = None)]
#[command(version = VERSION.as_str())]
struct Cli {
    /// Print debug output to the console
    #[arg(short, long, env = "AAC_IMPORT_VERBOSE")]
    verbose: bool,

    /// Move files created during the run into the holding directory instead of deleting them
    #[arg(long)]
    no_cleanup: bool,

    /// Install terraform when no suitable version is found
    #[arg(long)]
    install: bool,

    /// Number of concurrent imports (overrides the configuration file)
    #[arg(short, long, env = "AAC_IMPORT_WORKERS")]
    workers: Option<usize>,

    /// Configuration file (defaults to .aac-import.yaml in the working directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the terraform configuration (defaults to current directory)
    #[arg(short, long)]
    dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{:#}", err), "Operation failed");
            TerminalOutput.error(&format!("{:#}", err));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let dir = match cli.dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };
    // Terraform runs inside this directory, so every path handed to it must be absolute
    let working_dir = std::fs::canonicalize(&dir)
        .with_context(|| format!("Working directory not found: {}", dir.display()))?;
    let ctx = Context::new(working_dir);

    let mut config = ImportConfig::load(&*ctx.fs, &ctx.working_dir, cli.config.as_deref())?;
    if let Some(workers) = cli.workers {
        config.workers = workers;
        config.validate()?;
    }

    logging::init_logging(&ctx.path(&config.log_file), cli.verbose)?;
    tracing::debug!(working_dir = %ctx.working_dir.display(), ?config, "starting");

    let args = ImportArgs {
        no_cleanup: cli.no_cleanup,
        install: cli.install,
        path_var: std::env::var_os("PATH"),
    };
    ImportCommand::execute(&ctx, &config, &args)?;

    Ok(())
}
