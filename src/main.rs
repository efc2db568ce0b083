//! history-stats CLI
//!
//! Loads configuration, logs in with credentials from the environment,
//! crawls the reading history and prints the JSON report on stdout. The
//! plain-text rendering goes to stderr next to the logs.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use history_stats::application::{
    HistoryStatsService, StatsRequest, ValidatedCrawlConfig, window_policy,
};
use history_stats::domain::CrawlEvent;
use history_stats::infrastructure::{
    ConfigManager, Credentials, HistoryPageParser, HistorySession, HttpClient, config::env,
    init_logging_with_config, log_system_info,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config_manager = match std::env::var(env::CONFIG_PATH) {
        Ok(path) => ConfigManager::with_path(path),
        Err(_) => ConfigManager::new()?,
    };
    let config = config_manager
        .load_config()
        .await
        .context("Failed to load configuration")?;

    init_logging_with_config(&config.logging).context("Failed to initialize logging")?;
    log_system_info();

    let run_id = uuid::Uuid::new_v4();
    info!("🚀 Starting history crawl {}", run_id);
    info!("Config file: {:?}", config_manager.config_path());

    let credentials = Credentials {
        username: std::env::var(env::USERNAME)
            .with_context(|| format!("{} is not set", env::USERNAME))?,
        password: std::env::var(env::PASSWORD)
            .with_context(|| format!("{} is not set", env::PASSWORD))?,
    };

    let cancel = CancellationToken::new();
    let client = Arc::new(HttpClient::new(&config.http)?.with_cancellation(cancel.clone()));
    let session = Arc::new(
        HistorySession::login(client, &config.http.base_url, &credentials, &config.selectors)
            .await
            .context("Login failed")?,
    );
    let parser = Arc::new(HistoryPageParser::new(&config.selectors)?);

    let today = chrono::Local::now().date_naive();
    let request = StatsRequest {
        crawl: ValidatedCrawlConfig::from_config(&config.crawl),
        window: window_policy(&config.window, today),
        top_k: config.report.top_k,
        include_all_rows: config.report.include_all_rows,
    };

    let service = HistoryStatsService::new(session.clone(), parser)
        .with_detail_fetcher(session)
        .with_cancellation(cancel.clone());

    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Ctrl-C received, cancelling crawl");
            ctrl_c_token.cancel();
        }
    });

    let outcome = service
        .run(&request, |event| match event {
            CrawlEvent::RecordAdded(_) => {}
            CrawlEvent::Backoff { .. } | CrawlEvent::Failed(_) => {
                if let Some(line) = event.status_line() {
                    warn!("⏳ {}", line);
                }
            }
            _ => {
                if let Some(line) = event.status_line() {
                    info!("📄 {}", line);
                }
            }
        })
        .await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(failure) => {
            error!("❌ Crawl {} failed: {}", run_id, failure);
            return Err(failure).context("History crawl failed");
        }
    };

    info!(
        "✅ Crawl {} finished: {} pages, stop reason {:?}",
        run_id, outcome.pages_fetched, outcome.stop_reason
    );
    if outcome.detail_failures > 0 {
        warn!("⚠️  {} works skipped after failed detail refresh", outcome.detail_failures);
    }

    eprintln!("{}", outcome.all_time_report.render_text());
    println!(
        "{}",
        serde_json::to_string_pretty(&outcome).context("Failed to serialize report")?
    );

    Ok(())
}
