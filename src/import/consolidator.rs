//! Sequential consolidation of state fragments into the canonical store

use super::candidate::Candidate;
use super::retry::RetryPolicy;
use super::state_store::StateStore;
use std::path::PathBuf;

/// What happened to one candidate's fragment during consolidation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The fragment became the canonical store
    Promoted,
    /// The fragment's resource was moved into the existing store
    Merged { attempts: u32 },
    /// No fragment was produced by the import phase
    Skipped,
    /// The fragment could not become the canonical store
    PromoteFailed { error: String },
    /// Every merge attempt failed
    Failed { attempts: u32, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub address: String,
    pub outcome: MergeOutcome,
}

impl MergeReport {
    pub fn landed(&self) -> bool {
        matches!(
            self.outcome,
            MergeOutcome::Promoted | MergeOutcome::Merged { .. }
        )
    }
}

pub struct StateConsolidator<'a> {
    store: &'a dyn StateStore,
    retry: RetryPolicy,
    backup: PathBuf,
}

impl<'a> StateConsolidator<'a> {
    pub fn new(store: &'a dyn StateStore, retry: RetryPolicy, backup: impl Into<PathBuf>) -> Self {
        Self {
            store,
            retry,
            backup: backup.into(),
        }
    }

    /// Fold every candidate's fragment into the canonical store, one at a time.
    ///
    /// The store's existence is checked once; after that a local flag tracks
    /// whether a fragment has been promoted. A failed merge is reported and
    /// consolidation moves on.
    pub fn run(&self, candidates: &[Candidate]) -> Vec<MergeReport> {
        let mut store_exists = self.store.exists();
        let total = candidates.len();

        candidates
            .iter()
            .enumerate()
            .map(|(index, candidate)| {
                tracing::debug!(?candidate, "merging");
                let outcome = if !self.store.has_fragment(candidate) {
                    tracing::debug!(address = %candidate.address, "no fragment, skipping");
                    MergeOutcome::Skipped
                } else if !store_exists {
                    self.promote(candidate, &mut store_exists)
                } else {
                    tracing::info!(progress = index + 1, total, "Merging {}", candidate.address);
                    self.merge(candidate)
                };

                MergeReport {
                    address: candidate.address.clone(),
                    outcome,
                }
            })
            .collect()
    }

    fn promote(&self, candidate: &Candidate, store_exists: &mut bool) -> MergeOutcome {
        match self.store.promote(candidate) {
            Ok(()) => {
                tracing::info!("Created state from {}", candidate.address);
                *store_exists = true;
                MergeOutcome::Promoted
            }
            Err(err) => {
                // Leave the flag unset so the next fragment gets promoted
                tracing::warn!(error = %format!("{:#}", err), "could not promote {}", candidate.address);
                MergeOutcome::PromoteFailed {
                    error: format!("{:#}", err),
                }
            }
        }
    }

    fn merge(&self, candidate: &Candidate) -> MergeOutcome {
        let attempts = self
            .retry
            .run(|_| self.store.merge(candidate, &self.backup));

        match attempts.result {
            Ok(()) => MergeOutcome::Merged {
                attempts: attempts.count,
            },
            Err(err) => {
                tracing::warn!(
                    attempts = attempts.count,
                    error = %format!("{:#}", err),
                    "could not merge {}",
                    candidate.address
                );
                MergeOutcome::Failed {
                    attempts: attempts.count,
                    error: format!("{:#}", err),
                }
            }
        }
    }
}
