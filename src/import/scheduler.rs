//! Concurrent import of candidates into private state fragments
//!
//! Each candidate gets its own fragment file so imports never contend for the
//! canonical state's lock. Terraform calls block, so every unit of work runs
//! on the blocking pool while a semaphore bounds how many run at once.

use super::candidate::Candidate;
use super::retry::RetryPolicy;
use crate::executor::{Executor, ImportOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::Instrument;

/// Final disposition of one candidate's import
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub candidate: Candidate,

    /// Attempts made against the backend
    pub attempts: u32,

    /// Last error when every attempt failed
    pub error: Option<String>,
}

impl ImportOutcome {
    pub fn success(candidate: Candidate, attempts: u32) -> Self {
        Self {
            candidate,
            attempts,
            error: None,
        }
    }

    pub fn failure(candidate: Candidate, attempts: u32, error: String) -> Self {
        Self {
            candidate,
            attempts,
            error: Some(error),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

pub struct ImportScheduler {
    executor: Arc<dyn Executor>,
    working_dir: PathBuf,
    retry: RetryPolicy,
}

impl ImportScheduler {
    pub fn new(
        executor: Arc<dyn Executor>,
        working_dir: impl Into<PathBuf>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            executor,
            working_dir: working_dir.into(),
            retry,
        }
    }

    /// Import every candidate with at most `concurrency` imports in flight.
    ///
    /// Returns once every candidate has either succeeded or used up its
    /// retries. Outcomes are in input order; a failed candidate leaves no
    /// fragment behind for consolidation and never stops the others.
    pub async fn run(&self, candidates: &[Candidate], concurrency: usize) -> Vec<ImportOutcome> {
        let semaphore = Arc::new(Semaphore::new(concurrency.clamp(1, Semaphore::MAX_PERMITS)));
        let total = candidates.len();
        let mut handles = Vec::with_capacity(total);

        for (index, candidate) in candidates.iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let executor = Arc::clone(&self.executor);
            let retry = self.retry;
            let options = ImportOptions {
                state_out: candidate.fragment_in(&self.working_dir),
                // The fragment is private to this candidate
                lock: false,
            };
            let candidate = candidate.clone();
            let span = tracing::info_span!("import", address = %candidate.address, id = %candidate.id);

            let handle = tokio::spawn(
                async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return ImportOutcome::failure(
                            candidate,
                            0,
                            "import pool closed".to_string(),
                        );
                    };

                    let span = tracing::Span::current();
                    let worker_candidate = candidate.clone();
                    let attempts = tokio::task::spawn_blocking(move || {
                        let _entered = span.enter();
                        import_with_retry(&*executor, &worker_candidate, &options, retry, index, total)
                    })
                    .await;

                    match attempts {
                        Ok((count, None)) => ImportOutcome::success(candidate, count),
                        Ok((count, Some(error))) => ImportOutcome::failure(candidate, count, error),
                        Err(e) => ImportOutcome::failure(candidate, 0, format!("Task panicked: {}", e)),
                    }
                }
                .instrument(span),
            );

            handles.push(handle);
        }

        // Barrier: wait for every import before consolidation starts
        let mut outcomes = Vec::with_capacity(total);
        for (handle, candidate) in handles.into_iter().zip(candidates) {
            let outcome = handle.await.unwrap_or_else(|e| {
                ImportOutcome::failure(candidate.clone(), 0, format!("Task panicked: {}", e))
            });
            outcomes.push(outcome);
        }

        outcomes
    }
}

fn import_with_retry(
    executor: &dyn Executor,
    candidate: &Candidate,
    options: &ImportOptions,
    retry: RetryPolicy,
    index: usize,
    total: usize,
) -> (u32, Option<String>) {
    tracing::info!(progress = index + 1, total, "Importing {}", candidate.id);
    tracing::debug!(fragment = %options.state_out.display(), "importing");

    // Back off and retry to ride out backend throttling
    let attempts = retry.run(|_| executor.import(&candidate.address, &candidate.id, options));

    match attempts.result {
        Ok(()) => {
            tracing::debug!(attempts = attempts.count, "imported");
            (attempts.count, None)
        }
        Err(err) => {
            tracing::warn!(
                attempts = attempts.count,
                error = %format!("{:#}", err),
                "could not import {} {}",
                candidate.address,
                candidate.id
            );
            (attempts.count, Some(format!("{:#}", err)))
        }
    }
}
