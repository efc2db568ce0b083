//! History Stats - reading-history crawler with windowed frequency statistics
//!
//! Walks a logged-in user's paginated reading history, recovers from rate
//! limiting, and folds every record into an all-time and a trailing-window
//! aggregate from which top-K rankings are reported.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export the entry points most callers need
pub use application::{HistoryStatsService, StatsOutcome, StatsRequest, StatsReport};
pub use domain::{CrawlError, CrawlEvent, CrawlResult, HistoryRecord};
