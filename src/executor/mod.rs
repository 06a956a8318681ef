pub mod binary;
#[allow(clippy::module_inception)]
pub mod executor;
pub mod plan;
pub mod terraform;

pub use executor::{Executor, ImportOptions, StateMoveOptions};
pub use terraform::TerraformExecutor;
