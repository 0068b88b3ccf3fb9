//! Build provider seam

pub mod command;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

use crate::config::AppSpec;
use crate::errors::RolloutError;

pub use command::CommandBuilder;

/// Target platform of a build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// Produces local binaries for the target platform
#[async_trait]
pub trait BuildProvider: Send + Sync {
    /// Build the application and return the binary path
    async fn build(&self, app: &AppSpec, platform: &Platform) -> Result<PathBuf, RolloutError>;

    /// Build a standalone program (a migration) into `output`
    async fn build_program(
        &self,
        source: &str,
        output: &Path,
        platform: &Platform,
    ) -> Result<PathBuf, RolloutError>;
}
