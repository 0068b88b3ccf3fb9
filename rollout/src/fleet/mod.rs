//! Fleet dispatch
//!
//! One worker per target server, each owning its session and running its
//! steps strictly in order. Workers report over a channel; a single
//! collector builds the [`FleetReport`]. A failing server never stops its
//! siblings.

pub mod cancel;
pub mod executor;
pub mod report;
pub mod targets;

pub use cancel::{CancelHandle, CancelSignal};
pub use executor::{Action, DeployPlan, FleetExecutor, ScriptSet};
pub use report::{Completion, Failure, FleetReport, OperationResult, Outcome};
pub use targets::{resolve_targets, TargetSelector};
