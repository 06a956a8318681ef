pub mod import;

pub use import::{ImportArgs, ImportCommand};
