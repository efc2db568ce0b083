//! Aggregate statistics over history records

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::history_record::HistoryRecord;

/// Category of list-valued record attributes whose values are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Relationship,
    Fandom,
    FreeformTag,
    Author,
}

impl Category {
    pub const ALL: [Self; 4] = [
        Self::Relationship,
        Self::Fandom,
        Self::FreeformTag,
        Self::Author,
    ];

    /// Report column heading.
    pub const fn heading(self) -> &'static str {
        match self {
            Self::Relationship => "Top ships",
            Self::Fandom => "Top fandoms",
            Self::FreeformTag => "Top tags",
            Self::Author => "Top authors",
        }
    }

    pub fn values(self, record: &HistoryRecord) -> &[String] {
        match self {
            Self::Relationship => &record.relationships,
            Self::Fandom => &record.fandoms,
            Self::FreeformTag => &record.freeform_tags,
            Self::Author => &record.authors,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Relationship => "relationships",
            Self::Fandom => "fandoms",
            Self::FreeformTag => "tags",
            Self::Author => "authors",
        };
        f.write_str(name)
    }
}

/// Occurrence counts per category value. Counts only ever grow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrequencyMap {
    counts: HashMap<String, u64>,
}

impl FrequencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, value: &str) {
        self.add(value, 1);
    }

    pub fn add(&mut self, value: &str, amount: u64) {
        match self.counts.get_mut(value) {
            Some(count) => *count = count.saturating_add(amount),
            None => {
                self.counts.insert(value.to_string(), amount);
            }
        }
    }

    /// Overwrite a value's count (last write wins). Used for visit counts,
    /// where a title maps to one work and counts must not be summed.
    pub fn set(&mut self, value: &str, count: u64) {
        self.counts.insert(value.to_string(), count);
    }

    pub fn get(&self, value: &str) -> u64 {
        self.counts.get(value).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(value, count)| (value.as_str(), *count))
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for FrequencyMap {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        Self {
            counts: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl IntoIterator for FrequencyMap {
    type Item = (String, u64);
    type IntoIter = std::collections::hash_map::IntoIter<String, u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.counts.into_iter()
    }
}

/// Word volume, visit counts and category frequencies for a set of records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    pub total_word_count: u64,
    pub record_count: u64,
    /// title → visit count of the most recently folded record with that title
    pub visit_counts: FrequencyMap,
    pub relationships: FrequencyMap,
    pub fandoms: FrequencyMap,
    pub tags: FrequencyMap,
    pub authors: FrequencyMap,
}

impl Aggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record in. Duplicate values inside a single record are
    /// counted once per occurrence.
    pub fn add_record(&mut self, record: &HistoryRecord) {
        self.total_word_count = self.total_word_count.saturating_add(record.word_count);
        self.record_count += 1;
        self.visit_counts
            .set(&record.title, u64::from(record.visit_count));

        for category in Category::ALL {
            let map = self.category_mut(category);
            for value in category.values(record) {
                map.increment(value);
            }
        }
    }

    pub const fn category(&self, category: Category) -> &FrequencyMap {
        match category {
            Category::Relationship => &self.relationships,
            Category::Fandom => &self.fandoms,
            Category::FreeformTag => &self.tags,
            Category::Author => &self.authors,
        }
    }

    pub const fn category_mut(&mut self, category: Category) -> &mut FrequencyMap {
        match category {
            Category::Relationship => &mut self.relationships,
            Category::Fandom => &mut self.fandoms,
            Category::FreeformTag => &mut self.tags,
            Category::Author => &mut self.authors,
        }
    }

    /// Number of distinct works (by title).
    pub fn works_count(&self) -> usize {
        self.visit_counts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::history_record::WorkId;

    fn record(id: &str, title: &str, fandoms: &[&str], words: u64) -> HistoryRecord {
        HistoryRecord::builder(WorkId::new(id).unwrap(), title)
            .fandoms(fandoms.iter().copied())
            .word_count(words)
            .build()
            .unwrap()
    }

    #[test]
    fn add_record_counts_every_occurrence() {
        let mut aggregate = Aggregate::new();
        aggregate.add_record(&record("1", "A", &["F1", "F1", "F2"], 10));
        assert_eq!(aggregate.fandoms.get("F1"), 2);
        assert_eq!(aggregate.fandoms.get("F2"), 1);
        assert_eq!(aggregate.total_word_count, 10);
        assert_eq!(aggregate.record_count, 1);
    }

    #[test]
    fn visit_counts_are_last_write_wins() {
        let mut aggregate = Aggregate::new();
        let first = HistoryRecord::builder(WorkId::new("1").unwrap(), "Same")
            .visit_count(5)
            .build()
            .unwrap();
        let second = HistoryRecord::builder(WorkId::new("2").unwrap(), "Same")
            .visit_count(2)
            .build()
            .unwrap();
        aggregate.add_record(&first);
        aggregate.add_record(&second);
        assert_eq!(aggregate.visit_counts.get("Same"), 2);
        assert_eq!(aggregate.works_count(), 1);
    }

    #[test]
    fn frequency_map_total_and_iter() {
        let map: FrequencyMap = [("a", 3), ("b", 4)].into_iter().collect();
        assert_eq!(map.total(), 7);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("missing"), 0);
        let mut entries: Vec<_> = map.iter().collect();
        entries.sort_unstable();
        assert_eq!(entries, vec![("a", 3), ("b", 4)]);
    }
}
