//! Append-only status history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RequestStatus;
use crate::types::Actor;

/// One committed transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub status: RequestStatus,
    pub updated_at: DateTime<Utc>,
    pub updated_by_uid: String,
    pub updated_by_name: String,
    pub comments: String,
}

impl StatusHistoryEntry {
    pub fn new(
        status: RequestStatus,
        actor: &Actor,
        updated_at: DateTime<Utc>,
        comments: impl Into<String>,
    ) -> Self {
        Self {
            status,
            updated_at,
            updated_by_uid: actor.uid.clone(),
            updated_by_name: actor.name.clone(),
            comments: comments.into(),
        }
    }
}

/// Ordered list of entries. Insertion order is the commit order; entries are
/// never edited, removed or reordered once pushed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct StatusHistory(Vec<StatusHistoryEntry>);

impl StatusHistory {
    pub(crate) fn starting_with(entry: StatusHistoryEntry) -> Self {
        Self(vec![entry])
    }

    pub(crate) fn append(&mut self, entry: StatusHistoryEntry) {
        self.0.push(entry);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entries(&self) -> &[StatusHistoryEntry] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &StatusHistoryEntry> {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&StatusHistoryEntry> {
        self.0.last()
    }

    /// Entries ordered by timestamp for display; ties keep commit order
    pub fn sorted_by_time(&self) -> Vec<&StatusHistoryEntry> {
        let mut entries: Vec<&StatusHistoryEntry> = self.0.iter().collect();
        entries.sort_by_key(|e| e.updated_at);
        entries
    }

    /// True if `self` extends `earlier` without touching its entries
    pub fn extends(&self, earlier: &StatusHistory) -> bool {
        self.0.len() >= earlier.0.len() && self.0[..earlier.0.len()] == earlier.0[..]
    }
}
