//! Error types for rollout

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for rollout
#[derive(Error, Debug)]
pub enum RolloutError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Build error: {0}")]
    BuildError(String),

    #[error("Packaging error: {0}")]
    PackagingError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Transfer error: {0}")]
    TransferError(String),

    #[error("Activation error: {0}")]
    ActivationError(String),

    #[error("Script exited with status {code}: {stderr}")]
    ScriptError { code: i32, stderr: String },

    #[error("Release not found: {0}")]
    RollbackNotFound(String),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

/// Error classification carried by per-server results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Build,
    Packaging,
    Connection,
    Transfer,
    Activation,
    Script,
    RollbackNotFound,
    Migration,
    Cancelled,
    Io,
}

impl RolloutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RolloutError::IoError(_) => ErrorKind::Io,
            RolloutError::JsonError(_) | RolloutError::ConfigError(_) => ErrorKind::Config,
            RolloutError::BuildError(_) => ErrorKind::Build,
            RolloutError::PackagingError(_) => ErrorKind::Packaging,
            RolloutError::ConnectionError(_) => ErrorKind::Connection,
            RolloutError::TransferError(_) => ErrorKind::Transfer,
            RolloutError::ActivationError(_) => ErrorKind::Activation,
            RolloutError::ScriptError { .. } => ErrorKind::Script,
            RolloutError::RollbackNotFound(_) => ErrorKind::RollbackNotFound,
            RolloutError::MigrationError(_) => ErrorKind::Migration,
            RolloutError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    /// Fatal errors stop the whole operation before anything reaches a server.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Config | ErrorKind::Build | ErrorKind::Packaging | ErrorKind::Io
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Config => "config",
            ErrorKind::Build => "build",
            ErrorKind::Packaging => "packaging",
            ErrorKind::Connection => "connection",
            ErrorKind::Transfer => "transfer",
            ErrorKind::Activation => "activation",
            ErrorKind::Script => "script",
            ErrorKind::RollbackNotFound => "rollback-not-found",
            ErrorKind::Migration => "migration",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Io => "io",
        };
        f.write_str(name)
    }
}

impl From<tera::Error> for RolloutError {
    fn from(err: tera::Error) -> Self {
        // tera nests the useful message (e.g. the missing variable) in its source chain
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        RolloutError::ConfigError(message)
    }
}

impl From<walkdir::Error> for RolloutError {
    fn from(err: walkdir::Error) -> Self {
        RolloutError::PackagingError(err.to_string())
    }
}
