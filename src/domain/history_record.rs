//! History record domain entity
//!
//! A `HistoryRecord` is the structured summary of one visited work as listed
//! on a history page. Records are validated at construction so that the rest
//! of the pipeline can rely on a non-empty identity and a visit count ≥ 1.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::CrawlError;

/// Opaque, stable reference to a work. Used as the dedup identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkId(String);

impl WorkId {
    pub fn new(raw: impl Into<String>) -> Result<Self, CrawlError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CrawlError::invalid_record("work id must not be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Extract the work id from a link such as `/works/123` or
    /// `/works/123/chapters/456`.
    pub fn from_href(href: &str) -> Option<Self> {
        let mut segments = href.split('/').filter(|s| !s.is_empty());
        while let Some(segment) = segments.next() {
            if segment == "works" {
                let id = segments.next()?;
                let id = id.split(['?', '#']).next().unwrap_or(id);
                return Self::new(id).ok();
            }
        }
        None
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for WorkId {
    type Error = CrawlError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<WorkId> for String {
    fn from(id: WorkId) -> Self {
        id.0
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One visited work, as extracted from a history page.
///
/// Deserialization goes through [`HistoryRecordBuilder`], so a decoded record
/// upholds the same rules as one built by the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RecordFields")]
pub struct HistoryRecord {
    pub work_id: WorkId,
    pub title: String,
    pub visit_count: u32,
    pub last_visited: Option<NaiveDate>,
    pub word_count: u64,
    pub authors: Vec<String>,
    pub fandoms: Vec<String>,
    pub relationships: Vec<String>,
    pub freeform_tags: Vec<String>,
}

/// Wire shape of [`HistoryRecord`] before validation.
#[derive(Deserialize)]
struct RecordFields {
    work_id: WorkId,
    title: String,
    #[serde(default = "default_visit_count")]
    visit_count: u32,
    #[serde(default)]
    last_visited: Option<NaiveDate>,
    #[serde(default)]
    word_count: u64,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    fandoms: Vec<String>,
    #[serde(default)]
    relationships: Vec<String>,
    #[serde(default)]
    freeform_tags: Vec<String>,
}

impl TryFrom<RecordFields> for HistoryRecord {
    type Error = CrawlError;

    fn try_from(fields: RecordFields) -> Result<Self, Self::Error> {
        Self::builder(fields.work_id, fields.title)
            .visit_count(fields.visit_count)
            .last_visited(fields.last_visited)
            .word_count(fields.word_count)
            .authors(fields.authors)
            .fandoms(fields.fandoms)
            .relationships(fields.relationships)
            .freeform_tags(fields.freeform_tags)
            .build()
    }
}

const fn default_visit_count() -> u32 {
    1
}

impl HistoryRecord {
    /// Start building a record. Optional fields default the same way the
    /// extractor defaults them when a page omits them.
    pub fn builder(work_id: WorkId, title: impl Into<String>) -> HistoryRecordBuilder {
        HistoryRecordBuilder {
            record: Self {
                work_id,
                title: title.into(),
                visit_count: default_visit_count(),
                last_visited: None,
                word_count: 0,
                authors: Vec::new(),
                fandoms: Vec::new(),
                relationships: Vec::new(),
                freeform_tags: Vec::new(),
            },
        }
    }

    /// True when the record's last visit is strictly after `cutoff`.
    /// Records without a date are never considered recent.
    pub fn visited_after(&self, cutoff: NaiveDate) -> bool {
        self.last_visited.is_some_and(|date| date > cutoff)
    }

    /// True when the record's last visit is strictly before `floor`.
    pub fn visited_before(&self, floor: NaiveDate) -> bool {
        self.last_visited.is_some_and(|date| date < floor)
    }
}

/// Builder for [`HistoryRecord`]
#[derive(Debug, Clone)]
pub struct HistoryRecordBuilder {
    record: HistoryRecord,
}

impl HistoryRecordBuilder {
    pub fn visit_count(mut self, visits: u32) -> Self {
        // the source never lists a work with zero visits
        self.record.visit_count = visits.max(1);
        self
    }

    pub fn last_visited(mut self, date: Option<NaiveDate>) -> Self {
        self.record.last_visited = date;
        self
    }

    pub fn word_count(mut self, words: u64) -> Self {
        self.record.word_count = words;
        self
    }

    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.record.authors = authors.into_iter().map(Into::into).collect();
        self
    }

    pub fn fandoms<I, S>(mut self, fandoms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.record.fandoms = fandoms.into_iter().map(Into::into).collect();
        self
    }

    pub fn relationships<I, S>(mut self, relationships: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.record.relationships = relationships.into_iter().map(Into::into).collect();
        self
    }

    pub fn freeform_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.record.freeform_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Result<HistoryRecord, CrawlError> {
        if self.record.title.trim().is_empty() {
            return Err(CrawlError::invalid_record(format!(
                "work {} has an empty title",
                self.record.work_id
            )));
        }
        Ok(self.record)
    }
}
