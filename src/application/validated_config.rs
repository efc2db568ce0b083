//! Validated crawl configuration
//!
//! Raw `CrawlConfig`/`WindowConfig` values from the config file are clamped
//! into safe ranges and converted to `Duration`s and retry policies before
//! the crawler sees them.

use std::time::Duration;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::aggregator::WindowPolicy;
use super::retry_policy::{CrawlRetryPolicy, RetryPolicy};
use crate::infrastructure::config::{CrawlConfig, WindowConfig, defaults};

/// Lower bound on the delay between page requests
pub const MIN_PER_PAGE_DELAY_MS: u64 = 1_000;
/// Lower bound on the rate-limit backoff
pub const MIN_RATE_LIMIT_BACKOFF_MS: u64 = 5_000;
pub const MAX_RATE_LIMIT_RETRIES: u32 = 100;
pub const MAX_TRANSPORT_RETRIES: u32 = 10;
pub const MAX_BULK_CONCURRENCY: usize = 8;
pub const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedCrawlConfig {
    /// 0-based index of the first page
    pub start_page: u32,
    /// Inclusive 0-based index of the last page
    pub max_pages: Option<u32>,
    pub per_page_delay: Duration,
    pub retry: CrawlRetryPolicy,
    pub bulk_mode: bool,
    pub bulk_concurrency: usize,
    pub refresh_details: bool,
    pub detail_delay: Duration,
}

impl ValidatedCrawlConfig {
    /// Create validated configuration, clamping unsafe values
    pub fn from_config(config: &CrawlConfig) -> Self {
        if config.per_page_delay_ms < MIN_PER_PAGE_DELAY_MS {
            warn!(
                "⚠️ per_page_delay_ms {} is below {}ms, clamping",
                config.per_page_delay_ms, MIN_PER_PAGE_DELAY_MS
            );
        }
        if config.bulk_mode {
            warn!("⚠️ Bulk mode issues concurrent requests against a rate-limited site");
        }

        let multiplier = if config.backoff_multiplier.is_finite() {
            config.backoff_multiplier.clamp(1.0, MAX_BACKOFF_MULTIPLIER)
        } else {
            1.0
        };
        let rate_limit_backoff = config.rate_limit_backoff_ms.max(MIN_RATE_LIMIT_BACKOFF_MS);
        let max_backoff = config.max_backoff_ms.max(rate_limit_backoff);
        let jitter = Duration::from_millis(config.jitter_ms);

        Self {
            start_page: config.start_page,
            max_pages: config.max_pages,
            per_page_delay: Duration::from_millis(
                config.per_page_delay_ms.max(MIN_PER_PAGE_DELAY_MS),
            ),
            retry: CrawlRetryPolicy {
                rate_limit: RetryPolicy {
                    max_retries: config.max_rate_limit_retries.min(MAX_RATE_LIMIT_RETRIES),
                    base_delay: Duration::from_millis(rate_limit_backoff),
                    backoff_multiplier: multiplier,
                    max_delay: Duration::from_millis(max_backoff),
                    jitter,
                },
                transport: RetryPolicy {
                    max_retries: config.max_transport_retries.min(MAX_TRANSPORT_RETRIES),
                    base_delay: Duration::from_millis(config.transport_backoff_ms),
                    backoff_multiplier: multiplier,
                    max_delay: Duration::from_millis(max_backoff.max(config.transport_backoff_ms)),
                    jitter,
                },
            },
            bulk_mode: config.bulk_mode,
            bulk_concurrency: config.bulk_concurrency.clamp(1, MAX_BULK_CONCURRENCY),
            refresh_details: config.refresh_details,
            detail_delay: Duration::from_millis(config.detail_delay_ms.max(MIN_PER_PAGE_DELAY_MS)),
        }
    }

    pub const fn with_pages(mut self, start_page: u32, max_pages: Option<u32>) -> Self {
        self.start_page = start_page;
        self.max_pages = max_pages;
        self
    }
}

impl Default for ValidatedCrawlConfig {
    fn default() -> Self {
        Self::from_config(&CrawlConfig::default())
    }
}

/// Turn day counts into concrete dates relative to `today`.
pub fn window_policy(config: &WindowConfig, today: NaiveDate) -> WindowPolicy {
    let days_before = |days: u32| today.checked_sub_days(Days::new(u64::from(days)));
    WindowPolicy {
        window_cutoff: config.window_days.and_then(days_before),
        global_floor: config.global_floor_days.and_then(days_before),
        stop_at_floor: config.stop_at_floor && config.global_floor_days.is_some(),
    }
}

/// Window policy with the default one-year window and three-year floor.
pub fn default_window_policy(today: NaiveDate) -> WindowPolicy {
    window_policy(
        &WindowConfig {
            window_days: Some(defaults::WINDOW_DAYS),
            global_floor_days: Some(defaults::GLOBAL_FLOOR_DAYS),
            stop_at_floor: true,
        },
        today,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_survive_validation() {
        let validated = ValidatedCrawlConfig::default();
        assert_eq!(validated.per_page_delay, Duration::from_secs(3));
        assert_eq!(validated.retry.rate_limit.base_delay, Duration::from_secs(60));
        assert_eq!(validated.retry.rate_limit.max_retries, 10);
        assert_eq!(validated.retry.transport.max_retries, 3);
        assert!(!validated.bulk_mode);
    }

    #[test]
    fn test_unsafe_values_are_clamped() {
        let raw = CrawlConfig {
            per_page_delay_ms: 0,
            rate_limit_backoff_ms: 10,
            max_rate_limit_retries: 10_000,
            max_transport_retries: 500,
            backoff_multiplier: f64::NAN,
            bulk_concurrency: 0,
            ..CrawlConfig::default()
        };
        let validated = ValidatedCrawlConfig::from_config(&raw);

        assert_eq!(validated.per_page_delay, Duration::from_millis(MIN_PER_PAGE_DELAY_MS));
        assert_eq!(
            validated.retry.rate_limit.base_delay,
            Duration::from_millis(MIN_RATE_LIMIT_BACKOFF_MS)
        );
        assert_eq!(validated.retry.rate_limit.max_retries, MAX_RATE_LIMIT_RETRIES);
        assert_eq!(validated.retry.transport.max_retries, MAX_TRANSPORT_RETRIES);
        assert!((validated.retry.rate_limit.backoff_multiplier - 1.0).abs() < f64::EPSILON);
        assert_eq!(validated.bulk_concurrency, 1);
    }

    #[test]
    fn test_window_policy_dates() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let policy = window_policy(
            &WindowConfig {
                window_days: Some(30),
                global_floor_days: None,
                stop_at_floor: true,
            },
            today,
        );
        assert_eq!(policy.window_cutoff, NaiveDate::from_ymd_opt(2024, 5, 31));
        assert_eq!(policy.global_floor, None);
        assert!(!policy.stop_at_floor);

        let defaults = default_window_policy(today);
        assert_eq!(defaults.window_cutoff, NaiveDate::from_ymd_opt(2023, 7, 1));
        assert!(defaults.stop_at_floor);
    }
}
