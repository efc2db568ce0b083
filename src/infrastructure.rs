//! Infrastructure layer for HTTP access, HTML parsing, configuration and logging
//!
//! Adapters behind the domain's `PageFetcher`, `RecordExtractor` and
//! `WorkDetailFetcher` contracts live here, together with the ambient
//! configuration and logging setup used by the binary.

pub mod config;
pub mod history_session;
pub mod http_client;
pub mod logging;
pub mod parsing;

// Re-export commonly used items
pub use config::{
    AppConfig, ConfigManager, CrawlConfig, HttpConfig, LoggingConfig, ReportConfig, WindowConfig,
};
pub use history_session::{Credentials, HistorySession, classify_status};
pub use http_client::{HttpClient, HttpResponse};
pub use logging::{get_log_directory, init_logging, init_logging_with_config, log_system_info};
pub use parsing::{HistoryPageParser, HistorySelectors, WorkDetailParser, WorkSelectors};
