//! History listing page parser
//!
//! Turns one reading-history page into `HistoryRecord`s. Optional fields
//! default in place (words → 0, visits → 1, date → none). A page fails
//! only when the history list container is missing, or when it lists
//! entries and none of them can be read.

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::{debug, warn};

use super::config::HistorySelectors;
use super::{SelectorSet, element_text, parse_count};
use crate::domain::{CrawlError, CrawlResult, HistoryRecord, RawPage, RecordExtractor, WorkId};

const LAST_VISITED_DATE_FORMAT: &str = "%d %b %Y";

/// What became of one history list entry.
enum ItemOutcome {
    Parsed(HistoryRecord),
    /// Deleted or hidden work: a heading with no links at all
    Deleted,
    /// Links present but none of them usable
    Unreadable,
}

/// `scraper` 기반 히스토리 페이지 파서
#[derive(Debug, Clone)]
pub struct HistoryPageParser {
    history_list: SelectorSet,
    history_item: SelectorSet,
    heading_links: SelectorSet,
    fandom_links: SelectorSet,
    relationship_links: SelectorSet,
    freeform_links: SelectorSet,
    word_count: SelectorSet,
    viewed_heading: SelectorSet,
    pagination_items: SelectorSet,
    last_visited_re: Regex,
    visit_count_re: Regex,
}

impl HistoryPageParser {
    pub fn new(selectors: &HistorySelectors) -> CrawlResult<Self> {
        Ok(Self {
            history_list: SelectorSet::compile("history_list", &selectors.history_list)?,
            history_item: SelectorSet::compile("history_item", &selectors.history_item)?,
            heading_links: SelectorSet::compile("heading_links", &selectors.heading_links)?,
            fandom_links: SelectorSet::compile("fandom_links", &selectors.fandom_links)?,
            relationship_links: SelectorSet::compile(
                "relationship_links",
                &selectors.relationship_links,
            )?,
            freeform_links: SelectorSet::compile("freeform_links", &selectors.freeform_links)?,
            word_count: SelectorSet::compile("word_count", &selectors.word_count)?,
            viewed_heading: SelectorSet::compile("viewed_heading", &selectors.viewed_heading)?,
            pagination_items: SelectorSet::compile(
                "pagination_items",
                &selectors.pagination_items,
            )?,
            last_visited_re: compile_regex(r"Last visited:\s*(\d{1,2} \w+ \d{4})")?,
            visit_count_re: compile_regex(r"Visited (\d+) times")?,
        })
    }

    pub fn with_default_selectors() -> CrawlResult<Self> {
        Self::new(&HistorySelectors::default())
    }

    fn parse_item(&self, item: ElementRef<'_>, page_number: u32) -> ItemOutcome {
        let mut work: Option<(WorkId, String)> = None;
        let mut authors = Vec::new();

        let links = self.heading_links.select_in(item);
        let has_links = !links.is_empty();
        for link in links {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            if href.starts_with("/works") && work.is_none() {
                if let Some(id) = WorkId::from_href(href) {
                    work = Some((id, element_text(link)));
                }
            } else if href.starts_with("/users") {
                authors.push(element_text(link));
            }
        }

        // deleted or hidden works keep a heading without a work link
        let Some((work_id, title)) = work else {
            if has_links {
                warn!("⚠️ History entry on page {} has no readable work link", page_number);
                return ItemOutcome::Unreadable;
            }
            debug!("Skipping history entry without work link on page {}", page_number);
            return ItemOutcome::Deleted;
        };

        let fandoms = self.link_texts(item, &self.fandom_links);
        let relationships = self.link_texts(item, &self.relationship_links);
        let freeform_tags = self.link_texts(item, &self.freeform_links);

        let word_count = self
            .word_count
            .first_in(item)
            .and_then(|dd| parse_count(&element_text(dd)))
            .unwrap_or(0);

        let (last_visited, visit_count) = self.parse_viewed(item);

        match HistoryRecord::builder(work_id, title)
            .authors(authors)
            .fandoms(fandoms)
            .relationships(relationships)
            .freeform_tags(freeform_tags)
            .word_count(word_count)
            .last_visited(last_visited)
            .visit_count(visit_count)
            .build()
        {
            Ok(record) => ItemOutcome::Parsed(record),
            Err(e) => {
                warn!("⚠️ Dropping history entry on page {}: {}", page_number, e);
                ItemOutcome::Unreadable
            }
        }
    }

    fn link_texts(&self, item: ElementRef<'_>, set: &SelectorSet) -> Vec<String> {
        set.select_in(item)
            .into_iter()
            .map(element_text)
            .filter(|text| !text.is_empty())
            .collect()
    }

    fn parse_viewed(&self, item: ElementRef<'_>) -> (Option<NaiveDate>, u32) {
        let mut last_visited = None;
        let mut visits = 1;

        for heading in self.viewed_heading.select_in(item) {
            let text = element_text(heading);
            if let Some(caps) = self.last_visited_re.captures(&text) {
                match NaiveDate::parse_from_str(&caps[1], LAST_VISITED_DATE_FORMAT) {
                    Ok(date) => last_visited = Some(date),
                    Err(e) => debug!("Unparseable visit date '{}': {}", &caps[1], e),
                }
            }
            if let Some(caps) = self.visit_count_re.captures(&text) {
                visits = caps[1].parse().unwrap_or(1);
            }
        }

        (last_visited, visits)
    }
}

impl RecordExtractor for HistoryPageParser {
    fn extract(&self, page: &RawPage) -> CrawlResult<Vec<HistoryRecord>> {
        let html = Html::parse_document(&page.body);
        let Some(list) = self.history_list.first_in_document(&html) else {
            return Err(CrawlError::malformed_page(page.page_number, "history list"));
        };

        let mut records = Vec::new();
        let mut unreadable = 0usize;
        for item in self.history_item.select_in(list) {
            match self.parse_item(item, page.page_number) {
                ItemOutcome::Parsed(record) => records.push(record),
                ItemOutcome::Deleted => {}
                ItemOutcome::Unreadable => unreadable += 1,
            }
        }

        // entries were listed but none could be read: the markup changed
        if records.is_empty() && unreadable > 0 {
            return Err(CrawlError::malformed_page(page.page_number, "history items"));
        }

        debug!(
            "📄 Page {}: extracted {} history records",
            page.page_number,
            records.len()
        );
        Ok(records)
    }

    fn total_pages(&self, page: &RawPage) -> Option<u32> {
        let html = Html::parse_document(&page.body);
        self.pagination_items
            .select_document(&html)
            .into_iter()
            .filter_map(|li| element_text(li).parse::<u32>().ok())
            .max()
    }
}

/// Read the login form's CSRF token from a page body.
pub fn parse_authenticity_token(body: &str, selectors: &HistorySelectors) -> CrawlResult<String> {
    let token_set = SelectorSet::compile("authenticity_token", &selectors.authenticity_token)?;
    let html = Html::parse_document(body);
    token_set
        .first_in_document(&html)
        .and_then(|input| input.value().attr("value"))
        .map(str::to_string)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| CrawlError::authentication_failed("login form has no authenticity token"))
}

fn compile_regex(pattern: &str) -> CrawlResult<Regex> {
    Regex::new(pattern).map_err(|e| CrawlError::configuration(format!("invalid regex '{pattern}': {e}")))
}
