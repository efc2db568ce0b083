//! History paginator
//!
//! Drives a `PageFetcher` page by page and turns the result into a lazy
//! stream of `CrawlEvent`s. Per page the state machine is
//! `Fetching → {Success | RateLimited/Transport → Backoff → Fetching |
//! retries exhausted → Failed}`.
//!
//! Events are produced on demand: a backoff or politeness sleep only
//! happens when the consumer asks for the next event, so a consumer that
//! stops polling stops the crawl without any further I/O.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dedup::Deduplicator;
use super::retry_policy::{RetryCounters, cancellable_sleep};
use super::validated_config::ValidatedCrawlConfig;
use crate::domain::{
    CrawlError, CrawlEvent, CrawlFailure, CrawlProgress, CrawlResult, CrawlSummary,
    HistoryRecord, PageFetcher, PageRange, RawPage, RecordExtractor, StopReason,
};

/// Which fetch to perform after a sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resume {
    Discover,
    Fetch(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Fetch page 1 to learn the total page count
    Discover,
    /// Fetch the page at this 0-based index
    Fetch(u32),
    /// Politeness delay or backoff before the next fetch
    Wait { delay: Duration, resume: Resume },
    Finished,
}

/// 히스토리 페이지네이터
pub struct HistoryPaginator {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn RecordExtractor>,
    config: ValidatedCrawlConfig,
    cancel: CancellationToken,
    phase: Phase,
    range: Option<PageRange>,
    discovery_page: Option<RawPage>,
    dedup: Deduplicator,
    records: Vec<HistoryRecord>,
    pages_fetched: u32,
    retries: RetryCounters,
    pending: VecDeque<CrawlEvent>,
}

impl HistoryPaginator {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn RecordExtractor>,
        config: ValidatedCrawlConfig,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            config,
            cancel: CancellationToken::new(),
            phase: Phase::Discover,
            range: None,
            discovery_page: None,
            dedup: Deduplicator::new(),
            records: Vec::new(),
            pages_fetched: 0,
            retries: RetryCounters::default(),
            pending: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub const fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// Known once the first page has been fetched.
    pub fn total_pages(&self) -> Option<u32> {
        self.range.map(|range| range.total_pages)
    }

    pub fn records_collected(&self) -> usize {
        self.records.len()
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished && self.pending.is_empty()
    }

    /// Advance the crawl until the next event. `None` once a terminal
    /// event has been delivered.
    pub async fn next_event(&mut self) -> Option<CrawlEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            match self.phase {
                Phase::Finished => return None,
                Phase::Discover => self.discover().await,
                Phase::Fetch(index) => self.fetch(index).await,
                Phase::Wait { delay, resume } => {
                    if let Err(error) = cancellable_sleep(delay, &self.cancel).await {
                        self.fail(error);
                        continue;
                    }
                    self.phase = match resume {
                        Resume::Discover => Phase::Discover,
                        Resume::Fetch(index) => Phase::Fetch(index),
                    };
                }
            }
        }
    }

    /// Lazy, non-restartable event stream.
    pub fn into_stream(self) -> impl Stream<Item = CrawlEvent> + Send {
        futures::stream::unfold(self, |mut paginator| async move {
            let event = paginator.next_event().await?;
            Some((event, paginator))
        })
    }

    /// Drive the crawl to its end, for batch consumers.
    pub async fn collect_all(mut self) -> Result<CrawlSummary, CrawlFailure> {
        while let Some(event) = self.next_event().await {
            match event {
                CrawlEvent::Done(summary) => return Ok(summary),
                CrawlEvent::Failed(failure) => return Err(failure),
                _ => {}
            }
        }
        Err(self.failure(CrawlError::Cancelled))
    }

    async fn fetch_page(&self, page_number: u32) -> CrawlResult<RawPage> {
        if self.cancel.is_cancelled() {
            return Err(CrawlError::Cancelled);
        }
        tokio::select! {
            result = self.fetcher.fetch_page(page_number) => result,
            () = self.cancel.cancelled() => Err(CrawlError::Cancelled),
        }
    }

    async fn discover(&mut self) {
        let page = match self.fetch_page(1).await {
            Ok(page) => page,
            Err(error) => {
                self.retry_or_fail(error, 1, Resume::Discover);
                return;
            }
        };
        self.retries = RetryCounters::default();

        let total_pages = self.extractor.total_pages(&page).unwrap_or(1).max(1);
        let range = PageRange::new(self.config.start_page, self.config.max_pages, total_pages);
        info!(
            "📚 History has {} pages, crawling {} (index {}..{})",
            total_pages,
            range.page_count(),
            range.start_index,
            range.end_index()
        );
        self.range = Some(range);

        if range.is_empty() {
            self.finish();
            return;
        }
        if range.start_index == 0 {
            self.discovery_page = Some(page);
        }
        self.phase = Phase::Fetch(range.start_index);
    }

    async fn fetch(&mut self, index: u32) {
        let page_number = PageRange::page_number(index);
        let page = match self.discovery_page.take() {
            Some(page) if page.page_number == page_number => page,
            _ => match self.fetch_page(page_number).await {
                Ok(page) => page,
                Err(error) => {
                    self.retry_or_fail(error, page_number, Resume::Fetch(index));
                    return;
                }
            },
        };
        self.retries = RetryCounters::default();

        let extracted = match self.extractor.extract(&page) {
            Ok(records) => records,
            Err(error) => {
                self.fail(error);
                return;
            }
        };

        self.pages_fetched += 1;
        let Some(range) = self.range else {
            self.fail(CrawlError::configuration("page range unknown before fetch"));
            return;
        };

        self.pending.push_back(CrawlEvent::Progress(CrawlProgress {
            page: page_number,
            total_pages: range.total_pages,
        }));
        info!("📖 Reading history page {} of {}", page_number, range.total_pages);

        let extracted_count = extracted.len();
        for record in self.dedup.filter(extracted) {
            self.pending.push_back(CrawlEvent::RecordAdded(record.clone()));
            self.records.push(record);
        }
        debug!(
            "Page {}: {} extracted, {} total after dedup",
            page_number,
            extracted_count,
            self.records.len()
        );

        if range.is_last(index) {
            self.finish();
        } else {
            let next = Phase::Fetch(index + 1);
            self.phase = if self.config.per_page_delay.is_zero() {
                next
            } else {
                Phase::Wait {
                    delay: self.config.per_page_delay,
                    resume: Resume::Fetch(index + 1),
                }
            };
        }
    }

    fn retry_or_fail(&mut self, error: CrawlError, page_number: u32, resume: Resume) {
        let Some(attempt) = self.retries.bump(&error) else {
            self.fail(error);
            return;
        };
        let within_bound = self
            .config
            .retry
            .policy_for(&error)
            .is_some_and(|policy| policy.should_retry(attempt - 1));
        if !within_bound {
            warn!(
                "❌ Page {}: retries exhausted after {} attempts: {}",
                page_number, attempt, error
            );
            self.fail(error);
            return;
        }
        let Some(delay) = self.config.retry.backoff_for(&error, attempt) else {
            self.fail(error);
            return;
        };

        warn!(
            "⏳ History page {} failed ({}), sleeping for {:?} before retry {}",
            page_number, error, delay, attempt
        );
        self.pending.push_back(CrawlEvent::Backoff {
            page: page_number,
            attempt,
            delay,
            reason: error,
        });
        self.phase = Phase::Wait { delay, resume };
    }

    fn failure(&self, error: CrawlError) -> CrawlFailure {
        CrawlFailure {
            error,
            pages_fetched: self.pages_fetched,
            total_pages: self.total_pages(),
            records_collected: self.records.len(),
        }
    }

    fn fail(&mut self, error: CrawlError) {
        warn!("🛑 Crawl failed after {} pages: {}", self.pages_fetched, error);
        let failure = self.failure(error);
        self.pending.push_back(CrawlEvent::Failed(failure));
        self.phase = Phase::Finished;
    }

    fn finish(&mut self) {
        let (total_pages, stop_reason) = self.range.map_or((0, StopReason::Completed), |range| {
            let reason = if range.bounded_by_max() {
                StopReason::MaxPagesReached
            } else {
                StopReason::Completed
            };
            (range.total_pages, reason)
        });
        info!(
            "✅ History crawl finished: {} pages, {} records ({})",
            self.pages_fetched,
            self.records.len(),
            stop_reason
        );
        self.pending.push_back(CrawlEvent::Done(CrawlSummary {
            records: std::mem::take(&mut self.records),
            pages_fetched: self.pages_fetched,
            total_pages,
            stop_reason,
        }));
        self.phase = Phase::Finished;
    }
}
