//! Immutable, sorted, binary-searchable message timeline.
//!
//! Entries carry their timestamp as the fixed-width RFC3339 UTC string they
//! were recorded with. String ordering equals chronological ordering for
//! that format, so sorting and binary search work on the raw strings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One `{timestamp, topic, data}` record, as persisted in the JSONL log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    #[serde(rename = "ts")]
    pub timestamp: String,
    pub topic: String,
    pub data: Value,
}

/// Immutable sorted vector of timeline entries.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    /// Build a timeline, stable-sorting entries by timestamp so same-stamp
    /// messages keep their arrival order.
    pub fn from_entries(mut entries: Vec<TimelineEntry>) -> Self {
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Timeline { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn at(&self, index: usize) -> Option<&TimelineEntry> {
        self.entries.get(index)
    }

    /// Index of the first entry with `timestamp >= t`. Returns `len()` when
    /// `t` is past the end, `0` when before the start (or the timeline is
    /// empty).
    pub fn find_index(&self, t: &str) -> usize {
        self.entries
            .partition_point(|entry| entry.timestamp.as_str() < t)
    }

    /// Entries in `[a, b]`, inclusive on both ends.
    pub fn range(&self, a: usize, b: usize) -> &[TimelineEntry] {
        let end = (b + 1).min(self.entries.len());
        let start = a.min(end);
        &self.entries[start..end]
    }

    /// First and last timestamps, when non-empty.
    pub fn time_range(&self) -> Option<(&str, &str)> {
        Some((
            self.entries.first()?.timestamp.as_str(),
            self.entries.last()?.timestamp.as_str(),
        ))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TimelineEntry> {
        self.entries.iter()
    }
}
