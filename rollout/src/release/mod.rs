//! Release state of one server
//!
//! Every server owns an independent history of tag-named release
//! directories and a single `current` indirection record naming the active
//! one. The [`ReleaseManager`] is the only code that changes either.

pub mod fsm;
pub mod history;
pub mod manager;
pub mod tag;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::storage::RemoteLayout;

pub use fsm::{ReleaseEvent, ReleaseFsm, ReleaseState};
pub use history::ReleaseHistory;
pub use manager::ReleaseManager;
pub use tag::Tag;

/// How many releases a server keeps after activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Retention {
    /// The active release plus predecessors, `n` in total
    Keep(usize),

    /// Rollback disabled: only the active release survives
    ActiveOnly,
}

impl Retention {
    /// Maximum history length after pruning
    pub fn limit(&self) -> usize {
        match self {
            Retention::Keep(n) => (*n).max(1),
            Retention::ActiveOnly => 1,
        }
    }
}

/// One staged release on one server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseRecord {
    pub tag: Tag,
    pub created_at: DateTime<Utc>,
    /// Release directory, relative to the remote home
    pub path: String,
    pub active: bool,
}

impl ReleaseRecord {
    pub fn new(tag: Tag, layout: &RemoteLayout, active: bool) -> Self {
        Self {
            created_at: tag.created_at(),
            path: layout.release_dir(tag.as_str()),
            tag,
            active,
        }
    }
}
