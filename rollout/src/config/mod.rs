//! Configuration loaded from `rollout.json`

pub mod app;
pub mod server;
pub mod settings;

pub use app::{AppSpec, FileSpec};
pub use server::{ServerAddr, ServerSpec};
pub use settings::Config;
