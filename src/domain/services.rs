//! 크롤링 협력자 트레이트 정의
//!
//! 페이지 수집(`PageFetcher`), 레코드 추출(`RecordExtractor`),
//! 작품 상세 재조회(`WorkDetailFetcher`) 경계를 정의합니다.
//! 코어 로직은 이 트레이트에만 의존하며 HTML 구조나 HTTP 세션을 알지 못합니다.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::errors::CrawlResult;
use super::history_record::{HistoryRecord, WorkId};

/// Raw content of one history page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPage {
    /// 1-based site page number
    pub page_number: u32,
    pub body: String,
}

impl RawPage {
    pub fn new(page_number: u32, body: impl Into<String>) -> Self {
        Self {
            page_number,
            body: body.into(),
        }
    }
}

/// 히스토리 페이지 수집 서비스
///
/// Implementations translate rate-limit signals (HTTP 429) into
/// `CrawlError::RateLimited` and must not retry internally.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// 단일 페이지 수집 (1-based page number)
    async fn fetch_page(&self, page_number: u32) -> CrawlResult<RawPage>;
}

/// 페이지 → 레코드 변환
pub trait RecordExtractor: Send + Sync {
    /// Records on the page, most-recent visit first. Missing optional
    /// fields are defaulted; only a missing history section is an error.
    fn extract(&self, page: &RawPage) -> CrawlResult<Vec<HistoryRecord>>;

    /// Total page count from the page's pagination metadata.
    /// `None` means the history fits on one page.
    fn total_pages(&self, page: &RawPage) -> Option<u32>;
}

/// Work metadata as shown on the work's own page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkDetails {
    pub title: Option<String>,
    pub word_count: Option<u64>,
    pub authors: Vec<String>,
    pub fandoms: Vec<String>,
    pub relationships: Vec<String>,
    pub freeform_tags: Vec<String>,
}

impl WorkDetails {
    /// Overlay these details on a history record. Visit count and
    /// last-visit date always come from the history listing.
    pub fn apply_to(self, record: &mut HistoryRecord) {
        if let Some(title) = self.title.filter(|t| !t.trim().is_empty()) {
            record.title = title;
        }
        if let Some(words) = self.word_count {
            record.word_count = words;
        }
        record.authors = self.authors;
        record.fandoms = self.fandoms;
        record.relationships = self.relationships;
        record.freeform_tags = self.freeform_tags;
    }
}

/// 작품 상세정보 재조회 서비스
#[async_trait]
pub trait WorkDetailFetcher: Send + Sync {
    async fn fetch_details(&self, work_id: &WorkId) -> CrawlResult<WorkDetails>;
}
