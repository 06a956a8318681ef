pub mod candidate;
pub mod consolidator;
pub mod janitor;
pub mod retry;
pub mod scheduler;
pub mod state_store;

pub use candidate::ChangeExtractor;
pub use consolidator::{MergeOutcome, MergeReport, StateConsolidator};
pub use janitor::{CleanupGuard, CleanupPolicy, WorkspaceJanitor, WorkspaceSnapshot};
pub use retry::RetryPolicy;
pub use scheduler::{ImportOutcome, ImportScheduler};
pub use state_store::FsStateStore;
