//! Release tags

use std::fmt;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::Serialize;

/// `YYYYMMDD-HHMMSS`, UTC
pub const TAG_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Timestamp-derived release name.
///
/// The fixed-width format makes lexicographic order equal chronological order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    pub fn from_time(time: DateTime<Utc>) -> Self {
        Self(time.format(TAG_FORMAT).to_string())
    }

    /// Accepts only well-formed tags
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.len() != 15 {
            return None;
        }
        NaiveDateTime::parse_from_str(s, TAG_FORMAT)
            .ok()
            .map(|_| Self(s.to_string()))
    }

    /// Tag for a release staged at `now`, strictly after `newest`
    pub fn next(now: DateTime<Utc>, newest: Option<&Tag>) -> Self {
        let candidate = Self::from_time(now);
        match newest {
            Some(newest) if candidate <= *newest => {
                Self::from_time(newest.created_at() + Duration::seconds(1))
            }
            _ => candidate,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(&self.0, TAG_FORMAT)
            .map(|t| t.and_utc())
            .unwrap_or_default()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
