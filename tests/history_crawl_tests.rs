//! End-to-end crawl tests through the public API
//!
//! Pages are served by the scripted fetcher; the HTML tests run the real
//! history page parser over markup shaped like the live site.

use std::sync::Arc;

use chrono::NaiveDate;
use futures::StreamExt;

use history_stats::application::{
    HistoryPaginator, HistoryStatsService, RankedEntry, StatsRequest, ValidatedCrawlConfig,
    WindowPolicy, aggregate, peek_top_k,
};
use history_stats::domain::{CrawlError, CrawlEvent, HistoryRecord, StopReason, WorkId};
use history_stats::infrastructure::HistoryPageParser;
use history_stats::test_utils::{
    JsonRecordExtractor, ScriptedFetcher, dated_record, page_body, sample_record,
};

fn with_fandoms(id: &str, words: u64, fandoms: &[&str]) -> HistoryRecord {
    HistoryRecord::builder(WorkId::new(id).unwrap(), format!("Work {id}"))
        .word_count(words)
        .fandoms(fandoms.iter().copied())
        .build()
        .unwrap()
}

fn html_entry(id: &str, words: u64, fandoms: &[&str], last_visited: &str) -> String {
    let fandom_links: String = fandoms
        .iter()
        .map(|f| format!(r#"<a class="tag" href="/tags/{f}/works">{f}</a>"#))
        .collect();
    format!(
        r#"<li id="work_{id}" class="reading work blurb group" role="article">
             <div class="header module">
               <h4 class="heading"><a href="/works/{id}">Work {id}</a> by <a rel="author" href="/users/writer/pseuds/writer">writer</a></h4>
               <h5 class="fandoms heading"><span class="landmark">Fandoms:</span> {fandom_links}</h5>
             </div>
             <dl class="stats"><dt class="words">Words:</dt><dd class="words">{words}</dd></dl>
             <div class="user module group">
               <h4 class="viewed heading"><span>Last visited:</span> {last_visited} (Latest version.) Visited 2 times</h4>
             </div>
           </li>"#
    )
}

fn html_page(total_pages: u32, entries: &[String]) -> String {
    let pagination: String = (1..=total_pages).map(|n| format!("<li>{n}</li>")).collect();
    format!(
        r#"<html><body><ol class="reading work index group">{}</ol>
           <ol class="pagination actions" title="pagination">{pagination}</ol></body></html>"#,
        entries.concat()
    )
}

fn request(window: WindowPolicy) -> StatsRequest {
    StatsRequest {
        crawl: ValidatedCrawlConfig::default(),
        window,
        top_k: 5,
        include_all_rows: false,
    }
}

#[tokio::test(start_paused = true)]
async fn three_record_scenario_over_two_pages() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let a = with_fandoms("1", 100, &["F1"]);
    let b = with_fandoms("2", 50, &["F1", "F2"]);
    let c = with_fandoms("3", 25, &["F2"]);
    fetcher.push_ok(1, page_body(2, &[a, b.clone()]));
    // the site shifts entries between pages while a crawl is running
    fetcher.push_ok(2, page_body(2, &[b, c]));

    let summary = HistoryPaginator::new(
        fetcher.clone(),
        Arc::new(JsonRecordExtractor),
        ValidatedCrawlConfig::default(),
    )
    .collect_all()
    .await
    .unwrap();

    assert_eq!(summary.stop_reason, StopReason::Completed);
    assert_eq!(summary.records.len(), 3);
    assert_eq!(fetcher.calls(), vec![1, 2]);

    let (all_time, windowed) = aggregate(&summary.records, None);
    assert_eq!(all_time, windowed);
    assert_eq!(all_time.total_word_count, 175);
    assert_eq!(all_time.fandoms.get("F1"), 2);
    assert_eq!(all_time.fandoms.get("F2"), 2);
    assert_eq!(
        peek_top_k(&all_time.fandoms, 2),
        vec![RankedEntry::new("F1", 2), RankedEntry::new("F2", 2)]
    );
}

#[tokio::test(start_paused = true)]
async fn bounded_crawl_fetches_exactly_two_site_pages() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    for page in 1..=5 {
        fetcher.push_ok(page, page_body(5, &[sample_record(&page.to_string(), 10)]));
    }

    let summary = HistoryPaginator::new(
        fetcher.clone(),
        Arc::new(JsonRecordExtractor),
        ValidatedCrawlConfig::default().with_pages(0, Some(1)),
    )
    .collect_all()
    .await
    .unwrap();

    assert_eq!(fetcher.calls(), vec![1, 2]);
    assert_eq!(summary.pages_fetched, 2);
    assert_eq!(summary.total_pages, 5);
    assert_eq!(summary.stop_reason, StopReason::MaxPagesReached);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_page_is_retried_once_over_the_stream() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.push_err(
        1,
        CrawlError::RateLimited {
            page: Some(1),
            retry_after: None,
        },
    );
    fetcher.push_ok(1, page_body(1, &[sample_record("1", 10), sample_record("2", 20)]));

    let events: Vec<CrawlEvent> = HistoryPaginator::new(
        fetcher.clone(),
        Arc::new(JsonRecordExtractor),
        ValidatedCrawlConfig::default(),
    )
    .into_stream()
    .collect()
    .await;

    let backoffs = events
        .iter()
        .filter(|e| matches!(e, CrawlEvent::Backoff { .. }))
        .count();
    assert_eq!(backoffs, 1);
    match events.last() {
        Some(CrawlEvent::Done(summary)) => assert_eq!(summary.records.len(), 2),
        other => panic!("expected Done, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn authentication_failure_ends_the_crawl() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.push_ok(1, page_body(3, &[sample_record("1", 10)]));
    fetcher.push_err(2, CrawlError::authentication_failed("session expired"));

    let failure = HistoryPaginator::new(
        fetcher.clone(),
        Arc::new(JsonRecordExtractor),
        ValidatedCrawlConfig::default(),
    )
    .collect_all()
    .await
    .unwrap_err();

    assert!(matches!(failure.error, CrawlError::AuthenticationFailed { .. }));
    assert_eq!(failure.pages_fetched, 1);
    assert_eq!(failure.total_pages, Some(3));
    assert_eq!(failure.records_collected, 1);
    assert_eq!(fetcher.calls(), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn service_builds_reports_from_html_pages() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.push_ok(
        1,
        html_page(
            2,
            &[
                html_entry("1", 100, &["F1"], "10 Jun 2024"),
                html_entry("2", 50, &["F1", "F2"], "09 Jun 2024"),
            ],
        ),
    );
    fetcher.push_ok(2, html_page(2, &[html_entry("3", 25, &["F2"], "01 Jan 2020")]));
    let parser = Arc::new(HistoryPageParser::with_default_selectors().unwrap());

    let service = HistoryStatsService::new(fetcher.clone(), parser);
    let cutoff = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let mut seen = Vec::new();
    let outcome = service
        .run(&request(WindowPolicy::with_cutoff(cutoff)), |event| {
            seen.push(event.clone());
        })
        .await
        .unwrap();

    assert_eq!(outcome.stop_reason, StopReason::Completed);
    assert_eq!(outcome.all_time.total_word_count, 175);
    assert_eq!(outcome.windowed.total_word_count, 150);
    assert_eq!(outcome.windowed.fandoms.get("F2"), 1);
    assert_eq!(outcome.all_time.authors.get("writer"), 3);

    let fandoms = &outcome.all_time_report.rankings;
    assert!(fandoms.iter().any(|ranking| ranking
        .entries
        .contains(&RankedEntry::new("F1", 2))));
    assert!(outcome.all_time_report.render_text().starts_with("===STATS===\nWords: 175\n"));
    assert!(matches!(seen.last(), Some(CrawlEvent::Done(_))));
}

#[tokio::test(start_paused = true)]
async fn service_stops_paging_at_the_floor() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let recent = NaiveDate::from_ymd_opt(2024, 6, 1);
    let ancient = NaiveDate::from_ymd_opt(2015, 6, 1);
    fetcher.push_ok(1, page_body(3, &[dated_record("1", 10, recent)]));
    fetcher.push_ok(
        2,
        page_body(
            3,
            &[
                dated_record("2", 20, recent),
                dated_record("3", 30, ancient),
            ],
        ),
    );
    fetcher.push_ok(3, page_body(3, &[sample_record("4", 40)]));

    let window = WindowPolicy {
        window_cutoff: None,
        global_floor: NaiveDate::from_ymd_opt(2020, 1, 1),
        stop_at_floor: true,
    };
    let outcome = HistoryStatsService::new(fetcher.clone(), Arc::new(JsonRecordExtractor))
        .run(&request(window), |_| {})
        .await
        .unwrap();

    assert_eq!(outcome.stop_reason, StopReason::FloorReached);
    assert_eq!(fetcher.calls(), vec![1, 2]);
    assert_eq!(outcome.all_time.total_word_count, 30);
    assert_eq!(outcome.records.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn page_of_unreadable_entries_fails_the_crawl() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.push_ok(1, html_page(2, &[html_entry("1", 100, &["F1"], "10 Jun 2024")]));
    let broken = html_entry("2", 50, &["F2"], "09 Jun 2024").replace("/works/", "/wrks/");
    fetcher.push_ok(2, html_page(2, &[broken]));
    let parser = Arc::new(HistoryPageParser::with_default_selectors().unwrap());

    let failure = HistoryPaginator::new(fetcher.clone(), parser, ValidatedCrawlConfig::default())
        .collect_all()
        .await
        .unwrap_err();

    assert_eq!(
        failure.error,
        CrawlError::malformed_page(2, "history items")
    );
    assert_eq!(failure.pages_fetched, 1);
    assert_eq!(failure.records_collected, 1);
    assert_eq!(fetcher.calls(), vec![1, 2]);
}
