//! Cross-page record deduplication

use std::collections::HashSet;

use crate::domain::{HistoryRecord, WorkId};

/// Accepts each work identity once per crawl.
#[derive(Debug, Clone, Default)]
pub struct Deduplicator {
    seen: HashSet<WorkId>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True on first sight of the record's work, false on every repeat.
    pub fn accept(&mut self, record: &HistoryRecord) -> bool {
        if self.seen.contains(&record.work_id) {
            return false;
        }
        self.seen.insert(record.work_id.clone())
    }

    /// Keep only first sightings, preserving order.
    pub fn filter(&mut self, records: Vec<HistoryRecord>) -> Vec<HistoryRecord> {
        records.into_iter().filter(|r| self.accept(r)).collect()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
