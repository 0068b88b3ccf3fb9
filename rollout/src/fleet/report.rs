//! Per-server outcomes and their aggregate

use serde::Serialize;

use crate::errors::{ErrorKind, RolloutError};
use crate::release::{ReleaseRecord, Tag};

/// What a server finished with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "completion", rename_all = "snake_case")]
pub enum Completion {
    Deployed { tag: Tag, pruned: Vec<Tag> },
    RolledBack { tag: Tag },
    Releases { releases: Vec<ReleaseRecord> },
    /// A rendered script that was not executed
    Script { script: String },
    Status {
        active: Option<Tag>,
        pid: Option<u32>,
        running: bool,
    },
    Migrated { programs: Vec<String> },
    Done,
}

/// A per-server failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub detail: String,
}

impl From<RolloutError> for Failure {
    fn from(err: RolloutError) -> Self {
        Self {
            kind: err.kind(),
            detail: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum Outcome {
    Success(Completion),
    Failed(Failure),
}

/// Terminal result of one server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    /// Server identity, `User@Host:Port`
    pub server: String,
    pub outcome: Outcome,
}

impl OperationResult {
    pub fn new(server: impl Into<String>, result: Result<Completion, RolloutError>) -> Self {
        Self {
            server: server.into(),
            outcome: match result {
                Ok(completion) => Outcome::Success(completion),
                Err(err) => Outcome::Failed(err.into()),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    pub fn failure(&self) -> Option<&Failure> {
        match &self.outcome {
            Outcome::Failed(failure) => Some(failure),
            Outcome::Success(_) => None,
        }
    }

    pub fn completion(&self) -> Option<&Completion> {
        match &self.outcome {
            Outcome::Success(completion) => Some(completion),
            Outcome::Failed(_) => None,
        }
    }
}

/// Every target's result, in target order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FleetReport {
    pub results: Vec<OperationResult>,
}

impl FleetReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &OperationResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &OperationResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    /// True when no server failed
    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    pub fn get(&self, server: &str) -> Option<&OperationResult> {
        self.results.iter().find(|r| r.server == server)
    }
}
