//! Diagnostics setup
//!
//! Two sinks: the console, filtered to `info` (or `debug` when verbose, or
//! whatever `AAC_IMPORT_LOG` says), and a log file in the working directory
//! that always receives debug output.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable overriding the console filter
pub const LOG_ENV: &str = "AAC_IMPORT_LOG";

/// Debug for this crate only; HTTP and runtime internals stay at info
const DEBUG_DIRECTIVES: &str = "info,aac_import=debug";

pub fn init_logging(log_file: &Path, verbose: bool) -> Result<()> {
    let default_level = if verbose { DEBUG_DIRECTIVES } else { "info" };
    let console_filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    let file = File::create(log_file)
        .with_context(|| format!("Failed to create log file: {}", log_file.display()))?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(EnvFilter::new(DEBUG_DIRECTIVES)),
        )
        .try_init()
        .context("Failed to install log subscriber")
}
