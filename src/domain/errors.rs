//! Crawl error taxonomy
//!
//! Page- and connection-level failures are typed so that the paginator can
//! decide between retrying and terminating the crawl. Record-level problems
//! never surface here from the extractor; they are defaulted in place.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrawlError {
    #[error("Rate limited by remote source (page {page:?})")]
    RateLimited {
        page: Option<u32>,
        retry_after: Option<Duration>,
    },

    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Transport error: {message}")]
    Transport {
        message: String,
        status: Option<u16>,
    },

    #[error("Malformed page {page}: missing {section}")]
    MalformedPage { page: u32, section: String },

    #[error("Failed to fetch details for work {work_id}: {reason}")]
    PerRecordFetch { work_id: String, reason: String },

    #[error("Invalid record: {reason}")]
    InvalidRecord { reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Crawl cancelled")]
    Cancelled,
}

impl CrawlError {
    pub const fn rate_limited(page: Option<u32>) -> Self {
        Self::RateLimited {
            page,
            retry_after: None,
        }
    }

    pub fn authentication_failed(reason: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            reason: reason.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
        }
    }

    pub fn http_status(status: u16, url: &str) -> Self {
        Self::Transport {
            message: format!("HTTP {status} from {url}"),
            status: Some(status),
        }
    }

    pub fn malformed_page(page: u32, section: impl Into<String>) -> Self {
        Self::MalformedPage {
            page,
            section: section.into(),
        }
    }

    pub fn per_record_fetch(work_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PerRecordFetch {
            work_id: work_id.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_record(reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            reason: reason.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Rate limiting and transport hiccups are worth another attempt;
    /// everything else ends the crawl.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transport { .. })
    }

    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Server-provided hint (e.g. `Retry-After`) if any.
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

pub type CrawlResult<T> = Result<T, CrawlError>;
