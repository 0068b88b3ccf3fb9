//! Finite state machine for a server's release pointer

use serde::{Deserialize, Serialize};

use crate::release::Tag;

/// Release state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseState {
    /// No active release
    Idle,

    /// Archive extracted into a release directory, pointer not yet moved
    Staged,

    /// The pointer names a live release
    Active,
}

/// Release event
#[derive(Debug, Clone)]
pub enum ReleaseEvent {
    /// Start staging a new release
    Stage(Tag),

    /// Upload or extraction failed
    StageFailed(String),

    /// Pointer moved to the given tag
    Activate(Tag),

    /// Pointer swap failed; the previous release stays in effect
    ActivateFailed(String),
}

/// Release FSM
#[derive(Debug, Clone)]
pub struct ReleaseFsm {
    state: ReleaseState,
    active: Option<Tag>,
    staged: Option<Tag>,
    error: Option<String>,
}

impl ReleaseFsm {
    /// Start from what the server reports as active
    pub fn new(active: Option<Tag>) -> Self {
        Self {
            state: if active.is_some() {
                ReleaseState::Active
            } else {
                ReleaseState::Idle
            },
            active,
            staged: None,
            error: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> &ReleaseState {
        &self.state
    }

    /// Tag the pointer names
    pub fn active(&self) -> Option<&Tag> {
        self.active.as_ref()
    }

    /// Tag staged but not yet activated
    pub fn staged(&self) -> Option<&Tag> {
        self.staged.as_ref()
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn settled(&self) -> ReleaseState {
        if self.active.is_some() {
            ReleaseState::Active
        } else {
            ReleaseState::Idle
        }
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: ReleaseEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (ReleaseState::Idle | ReleaseState::Active, ReleaseEvent::Stage(tag)) => {
                self.error = None;
                self.staged = Some(tag.clone());
                ReleaseState::Staged
            }

            (ReleaseState::Staged, ReleaseEvent::StageFailed(err)) => {
                self.error = Some(err.clone());
                self.staged = None;
                self.settled()
            }

            // Staged releases activate; rollbacks activate from any state
            (_, ReleaseEvent::Activate(tag)) => {
                self.error = None;
                if self.staged.as_ref() == Some(tag) {
                    self.staged = None;
                }
                self.active = Some(tag.clone());
                ReleaseState::Active
            }

            (_, ReleaseEvent::ActivateFailed(err)) => {
                self.error = Some(err.clone());
                self.settled()
            }

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for ReleaseFsm {
    fn default() -> Self {
        Self::new(None)
    }
}
