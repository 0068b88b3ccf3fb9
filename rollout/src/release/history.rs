//! Per-server release history

use crate::release::{ReleaseRecord, Retention, Tag};
use crate::storage::RemoteLayout;

/// Releases of one server, oldest first. At most one record is active.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseHistory {
    records: Vec<ReleaseRecord>,
}

impl ReleaseHistory {
    pub fn new(mut records: Vec<ReleaseRecord>) -> Self {
        records.sort_by(|a, b| a.tag.cmp(&b.tag));
        records.dedup_by(|a, b| a.tag == b.tag);
        Self { records }
    }

    /// Parse the output of the remote listing script.
    ///
    /// Lines are `current <tag>` or `release <tag>`; anything that is not a
    /// well-formed tag is ignored.
    pub fn from_listing(listing: &str, layout: &RemoteLayout) -> Self {
        let mut current = None;
        let mut tags = Vec::new();
        for line in listing.lines() {
            match line.split_once(' ') {
                Some(("current", tag)) => current = Tag::parse(tag),
                Some(("release", tag)) => tags.extend(Tag::parse(tag)),
                _ => {}
            }
        }

        let records = tags
            .into_iter()
            .map(|tag| {
                let active = current.as_ref() == Some(&tag);
                ReleaseRecord::new(tag, layout, active)
            })
            .collect();
        Self::new(records)
    }

    pub fn records(&self) -> &[ReleaseRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn active(&self) -> Option<&ReleaseRecord> {
        self.records.iter().find(|r| r.active)
    }

    pub fn newest(&self) -> Option<&ReleaseRecord> {
        self.records.last()
    }

    pub fn get(&self, tag: &Tag) -> Option<&ReleaseRecord> {
        self.records.iter().find(|r| &r.tag == tag)
    }

    pub fn contains(&self, tag: &Tag) -> bool {
        self.get(tag).is_some()
    }

    pub fn newest_first(&self) -> Vec<ReleaseRecord> {
        self.records.iter().rev().cloned().collect()
    }

    pub(crate) fn push(&mut self, record: ReleaseRecord) {
        self.records.retain(|r| r.tag != record.tag);
        self.records.push(record);
        self.records.sort_by(|a, b| a.tag.cmp(&b.tag));
    }

    /// Flip the active flag; every other record becomes inactive
    pub(crate) fn set_active(&mut self, tag: &Tag) {
        for record in self.records.iter_mut() {
            record.active = &record.tag == tag;
        }
    }

    pub(crate) fn remove(&mut self, tags: &[Tag]) {
        self.records.retain(|r| !tags.contains(&r.tag));
    }

    /// Tags to delete so the history fits the retention policy.
    ///
    /// Only inactive records are ever chosen, oldest first.
    pub fn plan_prune(&self, retention: Retention) -> Vec<Tag> {
        let excess = self.records.len().saturating_sub(retention.limit());
        self.records
            .iter()
            .filter(|r| !r.active)
            .take(excess)
            .map(|r| r.tag.clone())
            .collect()
    }
}
