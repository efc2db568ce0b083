//! Application layer module
//!
//! Crawl orchestration and statistics: pagination with backoff, bulk
//! collection, detail refresh, dual-window aggregation, top-K ranking and
//! report building.

pub mod aggregator;
pub mod bulk_collector;
pub mod dedup;
pub mod detail_refresh;
pub mod history_stats_service;
pub mod paginator;
pub mod report;
pub mod retry_policy;
pub mod top_k;
pub mod validated_config;

pub use aggregator::{FoldOutcome, WindowPolicy, WindowedAggregator, aggregate};
pub use bulk_collector::BulkHistoryCollector;
pub use dedup::Deduplicator;
pub use detail_refresh::{DetailRefresher, RefreshOutcome};
pub use history_stats_service::{HistoryStatsService, StatsOutcome, StatsRequest};
pub use paginator::HistoryPaginator;
pub use report::{CategoryRanking, StatsReport};
pub use retry_policy::{CrawlRetryPolicy, RetryPolicy};
pub use top_k::{FrequencyQueue, RankedEntry, interleave_rows, peek_top_k, top_k_by_category};
pub use validated_config::{ValidatedCrawlConfig, default_window_policy, window_policy};
