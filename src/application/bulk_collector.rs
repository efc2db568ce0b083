//! 동시 페이지 수집기 (bulk mode)
//!
//! One task per page, bounded by a semaphore. Each task fills its own
//! buffer; buffers are merged in page order and deduplicated afterwards, so
//! the result equals a sequential crawl over the same pages. The politeness
//! delay is slept while the permit is still held. A fatal error on any page
//! cancels the pages still in flight.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dedup::Deduplicator;
use super::retry_policy::{cancellable_sleep, retry_with_policy};
use super::validated_config::ValidatedCrawlConfig;
use crate::domain::{
    CrawlError, CrawlFailure, CrawlProgress, CrawlResult, CrawlSummary, HistoryRecord, PageFetcher,
    PageRange, RecordExtractor, StopReason,
};

pub struct BulkHistoryCollector {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn RecordExtractor>,
    config: ValidatedCrawlConfig,
    cancel: CancellationToken,
}

impl BulkHistoryCollector {
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
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn collect(&self) -> Result<CrawlSummary, CrawlFailure> {
        self.collect_with_progress(|_| {}).await
    }

    /// Collect every page, reporting each page as its task completes.
    /// Completion order is not page order. The first fatal page error
    /// cancels the remaining tasks.
    pub async fn collect_with_progress<F>(
        &self,
        mut on_progress: F,
    ) -> Result<CrawlSummary, CrawlFailure>
    where
        F: FnMut(CrawlProgress) + Send,
    {
        let fetcher = Arc::clone(&self.fetcher);
        let first_page = retry_with_policy(&self.config.retry, &self.cancel, "history page 1", || {
            fetcher.fetch_page(1)
        })
        .await
        .map_err(|error| CrawlFailure {
            error,
            pages_fetched: 0,
            total_pages: None,
            records_collected: 0,
        })?;

        let total_pages = self.extractor.total_pages(&first_page).unwrap_or(1).max(1);
        let range = PageRange::new(self.config.start_page, self.config.max_pages, total_pages);
        let concurrency = self.config.bulk_concurrency.max(1);

        info!(
            "🚀 Bulk collecting {} of {} pages with {} permits",
            range.page_count(),
            total_pages,
            concurrency
        );

        // cancelled on the first fatal page error, and with the caller's token
        let task_cancel = self.cancel.child_token();
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut buffers: Vec<(u32, Vec<HistoryRecord>)> = Vec::new();
        let mut first_error: Option<CrawlError> = None;
        let mut tasks = JoinSet::new();

        for index in range.indices() {
            if task_cancel.is_cancelled() {
                warn!("🛑 Task creation cancelled at page index {}", index);
                break;
            }

            if index == 0 {
                match self.extractor.extract(&first_page) {
                    Ok(records) => {
                        on_progress(CrawlProgress {
                            page: first_page.page_number,
                            total_pages,
                        });
                        buffers.push((index, records));
                    }
                    Err(e) => {
                        task_cancel.cancel();
                        first_error = Some(e);
                        break;
                    }
                }
                continue;
            }

            let fetcher = Arc::clone(&self.fetcher);
            let extractor = Arc::clone(&self.extractor);
            let semaphore = Arc::clone(&semaphore);
            let retry = self.config.retry.clone();
            let cancel = task_cancel.clone();
            let delay = self.config.per_page_delay;
            let is_last = range.is_last(index);

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| CrawlError::transport("semaphore closed"))?;
                debug!("🔓 Acquired permit for page index {}", index);

                let page_number = PageRange::page_number(index);
                let label = format!("history page {page_number}");
                let fetched = async {
                    let page = retry_with_policy(&retry, &cancel, &label, || {
                        fetcher.fetch_page(page_number)
                    })
                    .await?;
                    extractor.extract(&page)
                }
                .await;

                let records = match fetched {
                    Ok(records) => records,
                    Err(error) => {
                        // stop the other pages before this permit is released
                        if error != CrawlError::Cancelled {
                            cancel.cancel();
                        }
                        return Err(error);
                    }
                };

                if !is_last && cancellable_sleep(delay, &cancel).await.is_err() {
                    debug!("Politeness delay after page {} cut short", page_number);
                }
                Ok::<(u32, Vec<HistoryRecord>), CrawlError>((index, records))
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let outcome: CrawlResult<(u32, Vec<HistoryRecord>)> = joined
                .unwrap_or_else(|e| Err(CrawlError::transport(format!("task join failed: {e}"))));
            match outcome {
                Ok((index, records)) => {
                    on_progress(CrawlProgress {
                        page: PageRange::page_number(index),
                        total_pages,
                    });
                    buffers.push((index, records));
                }
                // either the caller cancelled or another page already failed
                Err(CrawlError::Cancelled) => {}
                Err(e) => {
                    warn!("❌ Bulk page task failed: {}", e);
                    task_cancel.cancel();
                    first_error.get_or_insert(e);
                }
            }
        }

        let pages_fetched = u32::try_from(buffers.len()).unwrap_or(u32::MAX);
        buffers.sort_by_key(|(index, _)| *index);
        let mut dedup = Deduplicator::new();
        let records: Vec<HistoryRecord> = buffers
            .into_iter()
            .flat_map(|(_, records)| records)
            .filter(|record| dedup.accept(record))
            .collect();

        if self.cancel.is_cancelled() && first_error.is_none() {
            first_error = Some(CrawlError::Cancelled);
        }
        if let Some(error) = first_error {
            return Err(CrawlFailure {
                error,
                pages_fetched,
                total_pages: Some(total_pages),
                records_collected: records.len(),
            });
        }

        let stop_reason = if range.bounded_by_max() {
            StopReason::MaxPagesReached
        } else {
            StopReason::Completed
        };
        info!(
            "✅ Bulk collection finished: {} pages, {} records",
            pages_fetched,
            records.len()
        );

        Ok(CrawlSummary {
            records,
            pages_fetched,
            total_pages,
            stop_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::paginator::HistoryPaginator;
    use crate::application::retry_policy::{CrawlRetryPolicy, RetryPolicy};
    use crate::test_utils::{JsonRecordExtractor, ScriptedFetcher, page_body, sample_record};
    use std::time::Duration;

    fn config(concurrency: usize) -> ValidatedCrawlConfig {
        ValidatedCrawlConfig {
            per_page_delay: Duration::from_secs(3),
            bulk_mode: true,
            bulk_concurrency: concurrency,
            retry: CrawlRetryPolicy {
                rate_limit: RetryPolicy::fixed(3, Duration::from_secs(60)),
                transport: RetryPolicy::fixed(0, Duration::from_secs(5)),
            },
            ..ValidatedCrawlConfig::default()
        }
    }

    fn scripted_history() -> Arc<ScriptedFetcher> {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let pages = [
            vec![sample_record("a", 10), sample_record("b", 20)],
            vec![sample_record("b", 20), sample_record("c", 30)],
            vec![sample_record("d", 40)],
            vec![sample_record("a", 10), sample_record("e", 50)],
        ];
        for (i, records) in pages.iter().enumerate() {
            let page_number = u32::try_from(i).unwrap() + 1;
            // one body for bulk, one for the sequential comparison run
            fetcher.push_ok(page_number, page_body(4, records));
            fetcher.push_ok(page_number, page_body(4, records));
        }
        fetcher
    }

    #[tokio::test(start_paused = true)]
    async fn test_bulk_output_equals_sequential_output() {
        let fetcher = scripted_history();
        let extractor = Arc::new(JsonRecordExtractor);

        let bulk = BulkHistoryCollector::new(fetcher.clone(), extractor.clone(), config(3))
            .collect()
            .await
            .unwrap();
        let sequential = HistoryPaginator::new(fetcher.clone(), extractor, config(1))
            .collect_all()
            .await
            .unwrap();

        assert_eq!(bulk.records, sequential.records);
        assert_eq!(bulk.pages_fetched, 4);
        assert_eq!(bulk.stop_reason, StopReason::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bulk_retries_rate_limited_pages() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push_ok(1, page_body(2, &[sample_record("a", 1)]));
        fetcher.push_err(2, CrawlError::rate_limited(Some(2)));
        fetcher.push_ok(2, page_body(2, &[sample_record("b", 1)]));

        let summary = BulkHistoryCollector::new(fetcher.clone(), Arc::new(JsonRecordExtractor), config(2))
            .collect()
            .await
            .unwrap();

        let ids: Vec<&str> = summary.records.iter().map(|r| r.work_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(fetcher.calls(), vec![1, 2, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bulk_failure_reports_progress() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push_ok(1, page_body(3, &[sample_record("a", 1)]));
        fetcher.push_ok(2, page_body(3, &[sample_record("b", 1)]));
        fetcher.push_err(3, CrawlError::authentication_failed("logged out"));

        let failure = BulkHistoryCollector::new(fetcher, Arc::new(JsonRecordExtractor), config(2))
            .collect()
            .await
            .unwrap_err();

        assert!(matches!(failure.error, CrawlError::AuthenticationFailed { .. }));
        assert_eq!(failure.pages_fetched, 2);
        assert_eq!(failure.total_pages, Some(3));
        assert_eq!(failure.records_collected, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_page_cancels_pages_still_waiting() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push_ok(1, page_body(6, &[sample_record("a", 1)]));
        fetcher.push_err(2, CrawlError::authentication_failed("logged out"));
        for page in 3..=6 {
            fetcher.push_ok(page, page_body(6, &[sample_record(&page.to_string(), 1)]));
        }

        let failure = BulkHistoryCollector::new(fetcher.clone(), Arc::new(JsonRecordExtractor), config(1))
            .collect()
            .await
            .unwrap_err();

        assert!(matches!(failure.error, CrawlError::AuthenticationFailed { .. }));
        // page 2 holds the only permit; the rest never reach the site
        assert_eq!(fetcher.calls(), vec![1, 2]);
        assert_eq!(failure.pages_fetched, 1);
        assert_eq!(failure.records_collected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_reported_for_every_page() {
        let fetcher = scripted_history();
        let mut seen = Vec::new();

        let summary = BulkHistoryCollector::new(fetcher, Arc::new(JsonRecordExtractor), config(2))
            .collect_with_progress(|progress| seen.push(progress))
            .await
            .unwrap();

        let mut pages: Vec<u32> = seen.iter().map(|p| p.page).collect();
        pages.sort_unstable();
        assert_eq!(pages, vec![1, 2, 3, 4]);
        assert!(seen.iter().all(|p| p.total_pages == 4));
        assert_eq!(summary.pages_fetched, 4);
    }
}
