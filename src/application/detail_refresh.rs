//! Per-work detail refresh
//!
//! Re-fetches each crawled work's own page and overlays the fresh metadata
//! on the record. Visit count and last-visit date stay as the history
//! listing reported them. A failing work is logged and left out; the rest
//! of the run continues. A rejected session or cancellation ends the run.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::retry_policy::{CrawlRetryPolicy, cancellable_sleep, retry_with_policy};
use crate::domain::{CrawlError, CrawlResult, HistoryRecord, WorkDetailFetcher};

/// Refreshed records plus the works that could not be refreshed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub records: Vec<HistoryRecord>,
    pub failures: Vec<CrawlError>,
}

pub struct DetailRefresher {
    fetcher: Arc<dyn WorkDetailFetcher>,
    retry: CrawlRetryPolicy,
    delay: Duration,
    cancel: CancellationToken,
}

impl DetailRefresher {
    pub fn new(fetcher: Arc<dyn WorkDetailFetcher>, retry: CrawlRetryPolicy, delay: Duration) -> Self {
        Self {
            fetcher,
            retry,
            delay,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Refresh every record in order. Cancellation and authentication
    /// failures abort the run; every other error only drops the work.
    pub async fn refresh(&self, records: Vec<HistoryRecord>) -> CrawlResult<RefreshOutcome> {
        let total = records.len();
        let mut outcome = RefreshOutcome::default();

        for (position, mut record) in records.into_iter().enumerate() {
            if position > 0 {
                cancellable_sleep(self.delay, &self.cancel).await?;
            }

            let label = format!("work {}", record.work_id);
            let fetched = retry_with_policy(&self.retry, &self.cancel, &label, || {
                self.fetcher.fetch_details(&record.work_id)
            })
            .await;

            match fetched {
                Ok(details) => {
                    details.apply_to(&mut record);
                    info!(
                        "🔄 Refreshed {}/{}: {} ({} words)",
                        position + 1,
                        total,
                        record.title,
                        record.word_count
                    );
                    outcome.records.push(record);
                }
                Err(error @ (CrawlError::Cancelled | CrawlError::AuthenticationFailed { .. })) => {
                    warn!("🛑 Detail refresh aborted at work {}: {}", record.work_id, error);
                    return Err(error);
                }
                Err(error) => {
                    let error = match error {
                        CrawlError::PerRecordFetch { .. } => error,
                        other => CrawlError::per_record_fetch(record.work_id.as_str(), other.to_string()),
                    };
                    warn!("⚠️ Skipping work {}: {}", record.work_id, error);
                    outcome.failures.push(error);
                }
            }
        }

        info!(
            "✅ Detail refresh finished: {} refreshed, {} skipped",
            outcome.records.len(),
            outcome.failures.len()
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::retry_policy::RetryPolicy;
    use crate::domain::WorkDetails;
    use crate::test_utils::{ScriptedDetailFetcher, sample_record};

    fn refresher(fetcher: &Arc<ScriptedDetailFetcher>) -> DetailRefresher {
        DetailRefresher::new(
            fetcher.clone(),
            CrawlRetryPolicy {
                rate_limit: RetryPolicy::fixed(2, Duration::from_secs(60)),
                transport: RetryPolicy::fixed(0, Duration::from_secs(5)),
            },
            Duration::from_secs(3),
        )
    }

    fn details(words: u64, fandom: &str) -> WorkDetails {
        WorkDetails {
            word_count: Some(words),
            fandoms: vec![fandom.to_string()],
            ..WorkDetails::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_work_is_excluded() {
        let fetcher = Arc::new(ScriptedDetailFetcher::new());
        fetcher.push("1", Ok(details(100, "F1")));
        fetcher.push("2", Err(CrawlError::http_status(404, "/works/2")));
        fetcher.push("3", Ok(details(300, "F3")));

        let mut visited = sample_record("1", 0);
        visited.visit_count = 7;
        let outcome = refresher(&fetcher)
            .refresh(vec![visited, sample_record("2", 0), sample_record("3", 0)])
            .await
            .unwrap();

        let ids: Vec<&str> = outcome.records.iter().map(|r| r.work_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(outcome.records[0].word_count, 100);
        assert_eq!(outcome.records[0].visit_count, 7);
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(
            &outcome.failures[0],
            CrawlError::PerRecordFetch { work_id, .. } if work_id == "2"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_work_is_retried() {
        let fetcher = Arc::new(ScriptedDetailFetcher::new());
        fetcher.push("1", Err(CrawlError::rate_limited(None)));
        fetcher.push("1", Ok(details(42, "F")));

        let outcome = refresher(&fetcher)
            .refresh(vec![sample_record("1", 0)])
            .await
            .unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].fandoms, vec!["F".to_string()]);
        assert_eq!(fetcher.calls(), vec!["1".to_string(), "1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_session_aborts_refresh() {
        let fetcher = Arc::new(ScriptedDetailFetcher::new());
        fetcher.push("a", Ok(details(5, "F")));
        fetcher.push("b", Err(CrawlError::authentication_failed("session expired")));
        fetcher.push("c", Err(CrawlError::authentication_failed("session expired")));

        let result = refresher(&fetcher)
            .refresh(vec![sample_record("a", 0), sample_record("b", 0), sample_record("c", 0)])
            .await;

        assert!(matches!(result, Err(CrawlError::AuthenticationFailed { .. })));
        assert_eq!(fetcher.calls(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_refresh() {
        let fetcher = Arc::new(ScriptedDetailFetcher::new());
        fetcher.push("1", Ok(details(1, "F")));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = refresher(&fetcher)
            .with_cancellation(cancel)
            .refresh(vec![sample_record("1", 0)])
            .await;
        assert_eq!(result, Err(CrawlError::Cancelled));
    }
}
