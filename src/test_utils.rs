//! Test utilities for history-stats
//!
//! Scripted in-memory collaborators so crawls can be exercised without a
//! network or real markup. Pages are JSON documents of the form
//! `{"total_pages": N, "records": [...]}`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{
    CrawlError, CrawlResult, HistoryRecord, PageFetcher, RawPage, RecordExtractor,
    WorkDetailFetcher, WorkDetails, WorkId,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Page fetcher answering from per-page queues of scripted results.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<u32, VecDeque<CrawlResult<String>>>>,
    calls: Mutex<Vec<u32>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, page_number: u32, body: impl Into<String>) {
        self.push(page_number, Ok(body.into()));
    }

    pub fn push_err(&self, page_number: u32, error: CrawlError) {
        self.push(page_number, Err(error));
    }

    fn push(&self, page_number: u32, result: CrawlResult<String>) {
        lock(&self.responses)
            .entry(page_number)
            .or_default()
            .push_back(result);
    }

    /// Page numbers requested so far, in request order.
    pub fn calls(&self) -> Vec<u32> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch_page(&self, page_number: u32) -> CrawlResult<RawPage> {
        lock(&self.calls).push(page_number);
        let next = lock(&self.responses)
            .get_mut(&page_number)
            .and_then(VecDeque::pop_front);
        match next {
            Some(Ok(body)) => Ok(RawPage::new(page_number, body)),
            Some(Err(error)) => Err(error),
            None => Err(CrawlError::transport(format!(
                "no scripted response for page {page_number}"
            ))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PageFixture {
    #[serde(default)]
    total_pages: Option<u32>,
    records: Vec<HistoryRecord>,
}

/// Extractor for JSON page bodies built with [`page_body`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRecordExtractor;

impl RecordExtractor for JsonRecordExtractor {
    fn extract(&self, page: &RawPage) -> CrawlResult<Vec<HistoryRecord>> {
        serde_json::from_str::<PageFixture>(&page.body)
            .map(|fixture| fixture.records)
            .map_err(|_| CrawlError::malformed_page(page.page_number, "history list"))
    }

    fn total_pages(&self, page: &RawPage) -> Option<u32> {
        serde_json::from_str::<PageFixture>(&page.body)
            .ok()
            .and_then(|fixture| fixture.total_pages)
    }
}

/// JSON page body; `total_pages == 0` means no pagination metadata.
pub fn page_body(total_pages: u32, records: &[HistoryRecord]) -> String {
    let fixture = PageFixture {
        total_pages: (total_pages > 0).then_some(total_pages),
        records: records.to_vec(),
    };
    serde_json::to_string(&fixture).unwrap_or_default()
}

pub fn sample_record(id: &str, words: u64) -> HistoryRecord {
    dated_record(id, words, None)
}

pub fn dated_record(id: &str, words: u64, last_visited: Option<NaiveDate>) -> HistoryRecord {
    HistoryRecord {
        work_id: WorkId::new(id).unwrap_or_else(|_| panic!("invalid test work id {id:?}")),
        title: format!("Work {id}"),
        visit_count: 1,
        last_visited,
        word_count: words,
        authors: Vec::new(),
        fandoms: Vec::new(),
        relationships: Vec::new(),
        freeform_tags: Vec::new(),
    }
}

/// Detail fetcher answering from per-work queues of scripted results.
#[derive(Debug, Default)]
pub struct ScriptedDetailFetcher {
    responses: Mutex<HashMap<String, VecDeque<CrawlResult<WorkDetails>>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedDetailFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, work_id: &str, result: CrawlResult<WorkDetails>) {
        lock(&self.responses)
            .entry(work_id.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl WorkDetailFetcher for ScriptedDetailFetcher {
    async fn fetch_details(&self, work_id: &WorkId) -> CrawlResult<WorkDetails> {
        lock(&self.calls).push(work_id.to_string());
        lock(&self.responses)
            .get_mut(work_id.as_str())
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(CrawlError::per_record_fetch(
                    work_id.as_str(),
                    "no scripted response",
                ))
            })
    }
}
