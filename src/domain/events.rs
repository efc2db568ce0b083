//! Crawl events emitted by the history paginator
//!
//! Consumers that only need the final result can ignore everything but
//! `Done`/`Failed`; progress reporters can forward `Progress` and `Backoff`
//! as they arrive (e.g. as server-sent status lines).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::errors::CrawlError;
use super::history_record::HistoryRecord;

/// Why a crawl stopped pulling pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Every page up to the last one was fetched.
    Completed,
    /// The configured `max_pages` bound was reached.
    MaxPagesReached,
    /// The consumer saw a record older than the global floor and stopped.
    FloorReached,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "완료"),
            Self::MaxPagesReached => write!(f, "최대 페이지 도달"),
            Self::FloorReached => write!(f, "기간 하한 도달"),
        }
    }
}

/// Page-level progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlProgress {
    /// 1-based site page number just loaded
    pub page: u32,
    pub total_pages: u32,
}

impl CrawlProgress {
    pub fn percentage(&self) -> f64 {
        if self.total_pages == 0 {
            return 100.0;
        }
        f64::from(self.page) / f64::from(self.total_pages) * 100.0
    }
}

impl fmt::Display for CrawlProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reading history page {} of {}", self.page, self.total_pages)
    }
}

/// Result of a crawl that ended without error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlSummary {
    pub records: Vec<HistoryRecord>,
    pub pages_fetched: u32,
    pub total_pages: u32,
    pub stop_reason: StopReason,
}

impl CrawlSummary {
    pub fn is_complete(&self) -> bool {
        self.stop_reason == StopReason::Completed
    }
}

/// A crawl that terminated early because of an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("crawl failed after {pages_fetched} of {total_pages:?} pages: {error}")]
pub struct CrawlFailure {
    pub error: CrawlError,
    pub pages_fetched: u32,
    /// `None` when the failure happened before the page count was known
    pub total_pages: Option<u32>,
    pub records_collected: usize,
}

/// Item of the crawl stream.
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlEvent {
    Progress(CrawlProgress),
    /// A retryable error was hit; the paginator sleeps `delay` before
    /// attempting `page` again.
    Backoff {
        page: u32,
        attempt: u32,
        delay: Duration,
        reason: CrawlError,
    },
    RecordAdded(HistoryRecord),
    Done(CrawlSummary),
    Failed(CrawlFailure),
}

impl CrawlEvent {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Failed(_))
    }

    /// Human-readable status line, used by streaming progress reporters.
    pub fn status_line(&self) -> Option<String> {
        match self {
            Self::Progress(progress) => Some(progress.to_string()),
            Self::Backoff { page, delay, reason, .. } => Some(format!(
                "History page {page}: {reason}, sleeping for {} seconds",
                delay.as_secs()
            )),
            Self::Done(summary) => Some(format!(
                "Finished reading {} pages ({} records)",
                summary.pages_fetched,
                summary.records.len()
            )),
            Self::Failed(failure) => Some(failure.to_string()),
            Self::RecordAdded(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_status_line() {
        let event = CrawlEvent::Progress(CrawlProgress {
            page: 2,
            total_pages: 8,
        });
        assert_eq!(
            event.status_line().unwrap(),
            "Reading history page 2 of 8"
        );
        assert!(!event.is_terminal());
    }

    #[test]
    fn backoff_status_line_mentions_delay() {
        let event = CrawlEvent::Backoff {
            page: 3,
            attempt: 1,
            delay: Duration::from_secs(60),
            reason: CrawlError::rate_limited(Some(3)),
        };
        let line = event.status_line().unwrap();
        assert!(line.contains("60 seconds"));
    }

    #[test]
    fn percentage_handles_zero_total() {
        let progress = CrawlProgress {
            page: 0,
            total_pages: 0,
        };
        assert!((progress.percentage() - 100.0).abs() < f64::EPSILON);
    }
}
