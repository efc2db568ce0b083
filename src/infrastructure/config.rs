//! Configuration infrastructure
//!
//! Contains configuration loading and management for history crawling.
//!
//! Configuration is organized into sections:
//! 1. `crawl` - pagination bounds, politeness and retry policy
//! 2. `window` - all-time floor and trailing window sizes
//! 3. `http` / `selectors` - adapter settings for the remote site
//! 4. `report` / `logging` - output settings
//!
//! Credentials are never part of the file; they are read from the
//! environment at startup.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use super::parsing::HistorySelectors;

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub crawl: CrawlConfig,
    pub window: WindowConfig,
    pub http: HttpConfig,
    pub selectors: HistorySelectors,
    pub report: ReportConfig,
    pub logging: LoggingConfig,
}

/// Per-crawl pagination, politeness and retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// First page to fetch (0-indexed)
    pub start_page: u32,

    /// Inclusive upper bound on the page index (0-indexed); `None` = until last page
    pub max_pages: Option<u32>,

    /// Politeness sleep after each successful page, in milliseconds
    pub per_page_delay_ms: u64,

    /// Sleep before retrying a rate-limited page, in milliseconds
    pub rate_limit_backoff_ms: u64,

    /// Retries allowed for a rate-limited page before the crawl fails
    pub max_rate_limit_retries: u32,

    /// Sleep before retrying after a transport error, in milliseconds
    pub transport_backoff_ms: u64,

    /// Retries allowed for transport errors before the crawl fails
    pub max_transport_retries: u32,

    /// Backoff growth per attempt (1.0 = fixed backoff)
    pub backoff_multiplier: f64,

    /// Upper bound on any single backoff sleep, in milliseconds
    pub max_backoff_ms: u64,

    /// Random jitter added to each backoff, in milliseconds
    pub jitter_ms: u64,

    /// Fetch pages concurrently (bounded by `bulk_concurrency`)
    pub bulk_mode: bool,

    /// Permit count for bulk mode
    pub bulk_concurrency: usize,

    /// Re-fetch each work's own page for full metadata
    pub refresh_details: bool,

    /// Politeness sleep between work detail requests, in milliseconds
    pub detail_delay_ms: u64,
}

/// Trailing window and global floor, in days back from today
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Trailing window for the windowed aggregate; `None` = same as all-time
    pub window_days: Option<u32>,

    /// Records older than this are outside the all-time view
    pub global_floor_days: Option<u32>,

    /// Stop crawling further pages once a record older than the floor appears
    pub stop_at_floor: bool,
}

/// Remote site and HTTP client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
    /// Client-side request ceiling; 0 disables the limiter
    pub max_requests_per_second: u32,
}

/// Report settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub top_k: usize,
    /// Also include every ranked row (not just the top K) in the report
    pub include_all_rows: bool,
}

/// Logging configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs (file output only)
    pub json_format: bool,

    /// Enable console output (stderr, so stdout stays clean for reports)
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Log directory; defaults to `logs/` next to the executable
    pub log_dir: Option<PathBuf>,

    /// "never" or "daily"
    pub rotation: String,

    /// Number of log files to keep (older files are deleted on startup)
    pub max_files: u32,

    /// Module-specific log level filters (e.g., "reqwest": "info")
    pub module_filters: HashMap<String, String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            start_page: defaults::START_PAGE,
            max_pages: None,
            per_page_delay_ms: defaults::PER_PAGE_DELAY_MS,
            rate_limit_backoff_ms: defaults::RATE_LIMIT_BACKOFF_MS,
            max_rate_limit_retries: defaults::MAX_RATE_LIMIT_RETRIES,
            transport_backoff_ms: defaults::TRANSPORT_BACKOFF_MS,
            max_transport_retries: defaults::MAX_TRANSPORT_RETRIES,
            backoff_multiplier: defaults::BACKOFF_MULTIPLIER,
            max_backoff_ms: defaults::MAX_BACKOFF_MS,
            jitter_ms: 0,
            bulk_mode: false,
            bulk_concurrency: defaults::BULK_CONCURRENCY,
            refresh_details: false,
            detail_delay_ms: defaults::DETAIL_DELAY_MS,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_days: Some(defaults::WINDOW_DAYS),
            global_floor_days: Some(defaults::GLOBAL_FLOOR_DAYS),
            stop_at_floor: true,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BASE_URL.to_string(),
            user_agent: defaults::USER_AGENT.to_string(),
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_k: defaults::TOP_K,
            include_all_rows: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: None,
            rotation: defaults::LOG_ROTATION.to_string(),
            max_files: defaults::LOG_MAX_FILES,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("html5ever".to_string(), "warn".to_string());
                filters
            },
        }
    }
}

/// Configuration manager for loading and saving settings
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Get configuration directory path
    pub fn get_config_dir() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(defaults::APP_DIR_NAME);
        Ok(dir)
    }

    /// Manager for the default `config.json` location
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join("config.json");
        Ok(Self { config_path })
    }

    /// Manager for an explicit file path
    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!(
                "Configuration file not found, creating default: {:?}",
                self.config_path
            );
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;

        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("Loaded configuration from: {:?}", self.config_path);
                Ok(config)
            }
            Err(parse_error) => {
                warn!("⚠️  Configuration parse error: {}", parse_error);
                warn!("⚠️  Resetting to default configuration");

                let backup_path = self.config_path.with_extension("json.corrupted");
                if let Err(e) = fs::copy(&self.config_path, &backup_path).await {
                    warn!("Failed to create backup of corrupted config: {}", e);
                } else {
                    info!("Backed up corrupted config to: {:?}", backup_path);
                }

                let default_config = AppConfig::default();
                self.save_config(&default_config)
                    .await
                    .context("Failed to save default configuration")?;

                info!("✅ Reset to default configuration");
                Ok(default_config)
            }
        }
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Update crawl settings in place
    pub async fn update_crawl_config<F>(&self, updater: F) -> Result<()>
    where
        F: FnOnce(&mut CrawlConfig),
    {
        let mut config = self.load_config().await?;
        updater(&mut config.crawl);
        self.save_config(&config).await
    }

    /// Get configuration file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Environment variables read at startup
pub mod env {
    pub const USERNAME: &str = "HISTORY_STATS_USERNAME";
    pub const PASSWORD: &str = "HISTORY_STATS_PASSWORD";
    pub const CONFIG_PATH: &str = "HISTORY_STATS_CONFIG";
}

/// Default configuration values
pub mod defaults {
    pub const APP_DIR_NAME: &str = "history-stats";

    /// Default site root
    pub const BASE_URL: &str = "https://archiveofourown.org";

    pub const USER_AGENT: &str = "history-stats/0.1 (personal reading statistics)";

    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    pub const MAX_REQUESTS_PER_SECOND: u32 = 1;

    pub const START_PAGE: u32 = 0;

    /// 페이지 사이 대기 (rate limiter 회피)
    pub const PER_PAGE_DELAY_MS: u64 = 3_000;

    /// 429 응답 후 대기
    pub const RATE_LIMIT_BACKOFF_MS: u64 = 60_000;

    pub const MAX_RATE_LIMIT_RETRIES: u32 = 10;

    pub const TRANSPORT_BACKOFF_MS: u64 = 5_000;

    pub const MAX_TRANSPORT_RETRIES: u32 = 3;

    pub const BACKOFF_MULTIPLIER: f64 = 1.0;

    /// 5분 최대
    pub const MAX_BACKOFF_MS: u64 = 300_000;

    pub const BULK_CONCURRENCY: usize = 2;

    pub const DETAIL_DELAY_MS: u64 = 3_000;

    pub const WINDOW_DAYS: u32 = 365;

    pub const GLOBAL_FLOOR_DAYS: u32 = 3 * 365;

    pub const TOP_K: usize = 5;

    pub const LOG_LEVEL: &str = "info";

    pub const LOG_ROTATION: &str = "never";

    pub const LOG_MAX_FILES: u32 = 5;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_polite() {
        let config = AppConfig::default();
        assert_eq!(config.crawl.per_page_delay_ms, 3_000);
        assert_eq!(config.crawl.rate_limit_backoff_ms, 60_000);
        assert!(config.crawl.max_rate_limit_retries > 0);
        assert_eq!(config.window.window_days, Some(365));
        assert_eq!(config.report.top_k, 5);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"crawl": {"max_pages": 4}}"#).unwrap();
        assert_eq!(config.crawl.max_pages, Some(4));
        assert_eq!(config.crawl.start_page, 0);
        assert_eq!(config.http.base_url, defaults::BASE_URL);
    }

    #[tokio::test]
    async fn load_creates_default_file() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("nested/config.json"));
        let config = manager.load_config().await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(manager.config_path().exists());
    }

    #[tokio::test]
    async fn corrupted_file_is_backed_up_and_reset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let manager = ConfigManager::with_path(&path);
        let config = manager.load_config().await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(dir.path().join("config.json.corrupted").exists());
    }

    #[tokio::test]
    async fn update_crawl_config_persists() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.json"));
        manager
            .update_crawl_config(|crawl| crawl.max_pages = Some(2))
            .await
            .unwrap();
        let reloaded = manager.load_config().await.unwrap();
        assert_eq!(reloaded.crawl.max_pages, Some(2));
    }
}
