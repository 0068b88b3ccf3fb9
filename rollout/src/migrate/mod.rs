//! Ad-hoc migration programs
//!
//! Migrations are not releases: they are built locally, shipped as one
//! archive that stays on the server for manual replay, and never rolled back.

pub mod runner;
pub mod spec;

pub use runner::{execute, prepare, MigrationPlan, MigrationProgram};
pub use spec::{program_names, MigrationSpec};
