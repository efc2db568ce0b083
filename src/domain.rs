//! Domain module - Core entities, events and collaborator contracts
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod aggregate;
pub mod errors;
pub mod events;
pub mod history_record;
pub mod pagination;
pub mod services;

// Re-export commonly used items for convenience
pub use aggregate::{Aggregate, Category, FrequencyMap};
pub use errors::{CrawlError, CrawlResult};
pub use events::{CrawlEvent, CrawlFailure, CrawlProgress, CrawlSummary, StopReason};
pub use history_record::{HistoryRecord, HistoryRecordBuilder, WorkId};
pub use pagination::PageRange;
pub use services::{PageFetcher, RawPage, RecordExtractor, WorkDetailFetcher, WorkDetails};
