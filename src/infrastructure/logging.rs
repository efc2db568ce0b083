//! Logging system configuration and initialization
//!
//! This module provides the logging setup for the crawler:
//! - Console output on stderr (stdout is reserved for reports)
//! - Optional file logging through a non-blocking appender, daily or no rotation
//! - Structured JSON logging (optional, file output only)
//! - Dependency noise suppressed unless TRACE is requested
//! - Old log files cleaned up at startup

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use lazy_static::lazy_static;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

pub const LOG_FILE_NAME: &str = "history-stats.log";

/// HTTP and HTML parser internals held back below TRACE
const NOISY_DEPENDENCIES: &[&str] = &[
    "reqwest=info",
    "hyper=warn",
    "hyper_util=warn",
    "h2=warn",
    "html5ever=warn",
    "selectors=warn",
    "cookie_store=warn",
];

// Global guard to keep the log file writer alive
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> =
        Mutex::new(Vec::new());
}

/// Local wall-clock timestamps
struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f %:z"))
    }
}

/// Get the log directory relative to the executable location
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Filter for the configured level.
///
/// `RUST_LOG` wins when set. Otherwise HTTP and HTML parser internals are
/// held back unless the level is TRACE, and `module_filters` apply on top:
/// ```bash
/// RUST_LOG="debug,reqwest=debug,hyper=debug" history-stats
/// ```
pub fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut filter = EnvFilter::new(&config.level);
    let mut directives: Vec<String> = Vec::new();

    if !config.level.to_lowercase().contains("trace") {
        directives.extend(NOISY_DEPENDENCIES.iter().map(ToString::to_string));
    }
    let mut module_filters: Vec<(&String, &String)> = config.module_filters.iter().collect();
    module_filters.sort();
    directives.extend(module_filters.into_iter().map(|(module, level)| format!("{module}={level}")));
    directives.push(format!("history_stats={}", config.level));

    for directive in directives {
        match directive.parse() {
            Ok(parsed) => filter = filter.add_directive(parsed),
            Err(e) => warn!("Ignoring invalid log directive '{}': {}", directive, e),
        }
    }
    filter
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    if !config.file_output && !config.console_output {
        return Err(anyhow!("No logging output configured"));
    }

    let log_dir = config.log_dir.clone().unwrap_or_else(get_log_directory);

    let file_layer = if config.file_output {
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
        cleanup_old_logs(&log_dir, config.max_files)?;

        let appender = match config.rotation.as_str() {
            "daily" => rolling::daily(&log_dir, LOG_FILE_NAME),
            _ => rolling::never(&log_dir, LOG_FILE_NAME),
        };
        let (file_writer, file_guard) = non_blocking(appender);

        // Store the guard globally to prevent it from being dropped
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("log guard registry poisoned"))?
            .push(file_guard);

        let layer = if config.json_format {
            fmt::Layer::new()
                .json()
                .with_writer(file_writer)
                .with_timer(LocalTimeFormatter)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .boxed()
        } else {
            fmt::Layer::new()
                .with_writer(file_writer)
                .with_timer(LocalTimeFormatter)
                .with_target(false)
                .with_ansi(false)
                .boxed()
        };
        Some(layer)
    } else {
        None
    };

    let console_layer = config.console_output.then(|| {
        fmt::Layer::new()
            .with_writer(std::io::stderr)
            .with_timer(LocalTimeFormatter)
            .with_target(false)
    });

    Registry::default()
        .with(build_env_filter(config))
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    if config.file_output {
        info!("Log file: {}", log_dir.join(LOG_FILE_NAME).display());
        info!("Rotation: {}, keeping {} files", config.rotation, config.max_files);
    }
    if !config.level.to_lowercase().contains("trace") {
        info!("HTTP and HTML parser logs suppressed (use TRACE level to see all logs)");
    }

    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== History Stats System Information ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);
    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
    info!("========================================");
}

/// Delete the oldest `.log` files so that at most `max_files` remain.
/// Returns the number of files removed.
pub fn cleanup_old_logs(log_dir: &Path, max_files: u32) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let mut log_files = Vec::new();
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.contains(".log"));
        if path.is_file() && is_log {
            if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                log_files.push((path, modified));
            }
        }
    }

    // newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let keep = max_files as usize;
    let mut removed = 0;
    for (path, _) in log_files.iter().skip(keep) {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove old log file {:?}: {}", path, e);
        } else {
            info!("Removed old log file: {:?}", path);
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert!(!config.level.is_empty());
        assert!(config.console_output);
        assert!(!config.file_output);
    }

    #[test]
    fn test_log_directory_is_named_logs() {
        assert!(get_log_directory().to_string_lossy().ends_with("logs"));
    }

    #[test]
    fn test_filter_includes_module_overrides() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let mut config = LoggingConfig::default();
        config.module_filters.insert("governor".into(), "error".into());
        let rendered = build_env_filter(&config).to_string();
        assert!(rendered.contains("governor=error"));
        assert!(rendered.contains("history_stats=info"));
        assert!(rendered.contains("hyper=warn"));
    }

    #[test]
    fn test_trace_level_keeps_dependency_logs() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            level: "trace".into(),
            ..LoggingConfig::default()
        };
        let rendered = build_env_filter(&config).to_string();
        assert!(!rendered.contains("html5ever=warn"));
        assert!(rendered.contains("history_stats=trace"));
    }

    #[test]
    fn test_no_output_is_rejected() {
        let config = LoggingConfig {
            console_output: false,
            file_output: false,
            ..LoggingConfig::default()
        };
        assert!(init_logging_with_config(&config).is_err());
    }

    #[test]
    fn test_cleanup_keeps_newest_files() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        for (i, name) in ["a.log", "b.log", "c.log", "notes.txt"].iter().enumerate() {
            let path = dir.path().join(name);
            std::fs::write(&path, "x").unwrap();
            let file = std::fs::File::options().write(true).open(&path).unwrap();
            file.set_modified(now - Duration::from_secs(60 * (i as u64 + 1)))
                .unwrap();
        }

        let removed = cleanup_old_logs(dir.path(), 2).unwrap();

        assert_eq!(removed, 1);
        assert!(dir.path().join("a.log").exists());
        assert!(dir.path().join("b.log").exists());
        assert!(!dir.path().join("c.log").exists());
        assert!(dir.path().join("notes.txt").exists());
    }
}
