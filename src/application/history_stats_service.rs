//! History statistics service
//!
//! Composes the paginator (or the bulk collector), the windowed aggregator,
//! optional detail refresh and report building into one run. Stops pulling
//! pages as soon as the aggregator reports the global floor.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::aggregator::{FoldOutcome, WindowPolicy, WindowedAggregator};
use super::bulk_collector::BulkHistoryCollector;
use super::detail_refresh::DetailRefresher;
use super::paginator::HistoryPaginator;
use super::report::StatsReport;
use super::validated_config::ValidatedCrawlConfig;
use crate::domain::{
    Aggregate, CrawlError, CrawlEvent, CrawlFailure, CrawlSummary, HistoryRecord, PageFetcher,
    RecordExtractor, StopReason, WorkDetailFetcher,
};

/// Everything one run needs besides the collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsRequest {
    pub crawl: ValidatedCrawlConfig,
    pub window: WindowPolicy,
    pub top_k: usize,
    pub include_all_rows: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsOutcome {
    pub all_time: Aggregate,
    pub windowed: Aggregate,
    pub all_time_report: StatsReport,
    pub windowed_report: StatsReport,
    pub records: Vec<HistoryRecord>,
    pub pages_fetched: u32,
    pub total_pages: u32,
    pub stop_reason: StopReason,
    /// Works dropped because their details could not be refreshed
    pub detail_failures: usize,
}

/// 히스토리 통계 서비스
pub struct HistoryStatsService {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn RecordExtractor>,
    detail_fetcher: Option<Arc<dyn WorkDetailFetcher>>,
    cancel: CancellationToken,
}

impl HistoryStatsService {
    pub fn new(fetcher: Arc<dyn PageFetcher>, extractor: Arc<dyn RecordExtractor>) -> Self {
        Self {
            fetcher,
            extractor,
            detail_fetcher: None,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_detail_fetcher(mut self, detail_fetcher: Arc<dyn WorkDetailFetcher>) -> Self {
        self.detail_fetcher = Some(detail_fetcher);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run a full crawl, forwarding every event to `on_event`.
    pub async fn run<F>(
        &self,
        request: &StatsRequest,
        mut on_event: F,
    ) -> Result<StatsOutcome, CrawlFailure>
    where
        F: FnMut(&CrawlEvent) + Send,
    {
        let mut aggregator = WindowedAggregator::new(request.window);

        let (records, pages_fetched, total_pages, stop_reason) = if request.crawl.bulk_mode {
            self.collect_bulk(request, &mut aggregator, &mut on_event).await?
        } else {
            self.collect_sequential(request, &mut aggregator, &mut on_event)
                .await?
        };

        let (records, aggregator, detail_failures) = if request.crawl.refresh_details {
            self.refresh_details(request, records, pages_fetched, total_pages)
                .await?
        } else {
            (records, aggregator, 0)
        };

        let (all_time, windowed) = aggregator.finish();
        info!(
            "📊 Aggregated {} records ({} in window), {} words all-time",
            all_time.record_count, windowed.record_count, all_time.total_word_count
        );

        Ok(StatsOutcome {
            all_time_report: StatsReport::from_aggregate(
                &all_time,
                request.top_k,
                request.include_all_rows,
            ),
            windowed_report: StatsReport::from_aggregate(
                &windowed,
                request.top_k,
                request.include_all_rows,
            ),
            all_time,
            windowed,
            records,
            pages_fetched,
            total_pages,
            stop_reason,
            detail_failures,
        })
    }

    async fn collect_sequential<F>(
        &self,
        request: &StatsRequest,
        aggregator: &mut WindowedAggregator,
        on_event: &mut F,
    ) -> Result<(Vec<HistoryRecord>, u32, u32, StopReason), CrawlFailure>
    where
        F: FnMut(&CrawlEvent) + Send,
    {
        let mut paginator = HistoryPaginator::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.extractor),
            request.crawl.clone(),
        )
        .with_cancellation(self.cancel.clone());

        let mut kept = Vec::new();
        while let Some(event) = paginator.next_event().await {
            on_event(&event);
            match event {
                CrawlEvent::RecordAdded(record) => {
                    if let FoldOutcome::Folded { .. } = aggregator.fold(&record) {
                        kept.push(record);
                    }
                    if aggregator.should_stop() {
                        info!("🛑 Reached the history floor, no more pages needed");
                        let summary = CrawlSummary {
                            records: kept.clone(),
                            pages_fetched: paginator.pages_fetched(),
                            total_pages: paginator.total_pages().unwrap_or(0),
                            stop_reason: StopReason::FloorReached,
                        };
                        on_event(&CrawlEvent::Done(summary.clone()));
                        return Ok((kept, summary.pages_fetched, summary.total_pages, summary.stop_reason));
                    }
                }
                CrawlEvent::Done(summary) => {
                    return Ok((kept, summary.pages_fetched, summary.total_pages, summary.stop_reason));
                }
                CrawlEvent::Failed(failure) => return Err(failure),
                CrawlEvent::Progress(_) | CrawlEvent::Backoff { .. } => {}
            }
        }

        Err(CrawlFailure {
            error: CrawlError::Cancelled,
            pages_fetched: paginator.pages_fetched(),
            total_pages: paginator.total_pages(),
            records_collected: kept.len(),
        })
    }

    async fn collect_bulk<F>(
        &self,
        request: &StatsRequest,
        aggregator: &mut WindowedAggregator,
        on_event: &mut F,
    ) -> Result<(Vec<HistoryRecord>, u32, u32, StopReason), CrawlFailure>
    where
        F: FnMut(&CrawlEvent) + Send,
    {
        let collector = BulkHistoryCollector::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.extractor),
            request.crawl.clone(),
        )
        .with_cancellation(self.cancel.clone());

        let collected = collector
            .collect_with_progress(|progress| on_event(&CrawlEvent::Progress(progress)))
            .await;
        let mut summary = match collected {
            Ok(summary) => summary,
            Err(failure) => {
                on_event(&CrawlEvent::Failed(failure.clone()));
                return Err(failure);
            }
        };

        let mut kept = Vec::with_capacity(summary.records.len());
        for record in std::mem::take(&mut summary.records) {
            on_event(&CrawlEvent::RecordAdded(record.clone()));
            if let FoldOutcome::Folded { .. } = aggregator.fold(&record) {
                kept.push(record);
            }
            if aggregator.should_stop() {
                summary.stop_reason = StopReason::FloorReached;
                break;
            }
        }
        summary.records = kept.clone();
        on_event(&CrawlEvent::Done(summary.clone()));

        Ok((kept, summary.pages_fetched, summary.total_pages, summary.stop_reason))
    }

    async fn refresh_details(
        &self,
        request: &StatsRequest,
        records: Vec<HistoryRecord>,
        pages_fetched: u32,
        total_pages: u32,
    ) -> Result<(Vec<HistoryRecord>, WindowedAggregator, usize), CrawlFailure> {
        let mut aggregator = WindowedAggregator::new(request.window);
        let Some(detail_fetcher) = &self.detail_fetcher else {
            warn!("⚠️ Detail refresh requested but no detail fetcher configured");
            for record in &records {
                aggregator.fold(record);
            }
            return Ok((records, aggregator, 0));
        };

        let records_collected = records.len();
        let refresher = DetailRefresher::new(
            Arc::clone(detail_fetcher),
            request.crawl.retry.clone(),
            request.crawl.detail_delay,
        )
        .with_cancellation(self.cancel.clone());

        let outcome = refresher.refresh(records).await.map_err(|error| CrawlFailure {
            error,
            pages_fetched,
            total_pages: Some(total_pages),
            records_collected,
        })?;

        for record in &outcome.records {
            aggregator.fold(record);
        }
        Ok((outcome.records, aggregator, outcome.failures.len()))
    }
}
