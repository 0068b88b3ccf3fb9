//! Application layer: invocation options and user-level operations

pub mod options;
pub mod orchestrator;

pub use options::{RolloutOptions, Transport};
pub use orchestrator::Orchestrator;
