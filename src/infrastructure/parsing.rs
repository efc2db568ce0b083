//! HTML parsing infrastructure for history pages
//!
//! Implements the `RecordExtractor` contract on top of `scraper`, with
//! fallback selector lists loaded from configuration.

pub mod config;
pub mod history_page_parser;
pub mod work_detail_parser;

pub use config::{HistorySelectors, WorkSelectors};
pub use history_page_parser::HistoryPageParser;
pub use work_detail_parser::WorkDetailParser;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::domain::{CrawlError, CrawlResult};

/// Compiled fallback selectors for one logical field
#[derive(Debug, Clone)]
pub struct SelectorSet {
    field: &'static str,
    selectors: Vec<Selector>,
}

impl SelectorSet {
    /// Compile multiple selector strings; fails only when none compiles.
    pub fn compile(field: &'static str, selector_strings: &[String]) -> CrawlResult<Self> {
        let mut selectors = Vec::new();
        let mut errors = Vec::new();

        for selector_str in selector_strings {
            match Selector::parse(selector_str) {
                Ok(selector) => selectors.push(selector),
                Err(e) => {
                    warn!("Failed to compile selector '{}' for {}: {}", selector_str, field, e);
                    errors.push(format!("'{selector_str}': {e}"));
                }
            }
        }

        if selectors.is_empty() {
            return Err(CrawlError::configuration(format!(
                "No valid selectors for {field}. Errors: {}",
                errors.join(", ")
            )));
        }

        if !errors.is_empty() {
            debug!("Some selectors for {} failed to compile: {}", field, errors.join(", "));
        }

        Ok(Self { field, selectors })
    }

    pub const fn field(&self) -> &'static str {
        self.field
    }

    /// Matches of the first selector that matches anything in the document.
    pub fn select_document<'a>(&self, html: &'a Html) -> Vec<ElementRef<'a>> {
        for selector in &self.selectors {
            let found: Vec<ElementRef<'a>> = html.select(selector).collect();
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    /// Matches of the first selector that matches anything under `element`.
    pub fn select_in<'a>(&self, element: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        for selector in &self.selectors {
            let found: Vec<ElementRef<'a>> = element.select(selector).collect();
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    pub fn first_in<'a>(&self, element: ElementRef<'a>) -> Option<ElementRef<'a>> {
        self.select_in(element).into_iter().next()
    }

    pub fn first_in_document<'a>(&self, html: &'a Html) -> Option<ElementRef<'a>> {
        self.select_document(html).into_iter().next()
    }
}

/// Element text with whitespace collapsed.
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a count such as `12,345` or `12 345`. Non-numeric input yields `None`.
pub fn parse_count(raw: &str) -> Option<u64> {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '\u{a0}'))
        .collect();
    digits.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_keeps_valid_fallbacks() {
        let set = SelectorSet::compile(
            "test",
            &["li[".to_string(), "li.item".to_string()],
        )
        .unwrap();
        assert_eq!(set.field(), "test");
    }

    #[test]
    fn compile_fails_when_nothing_is_valid() {
        let err = SelectorSet::compile("broken", &["[[".to_string()]).unwrap_err();
        assert!(matches!(err, CrawlError::Configuration { .. }));
    }

    #[test]
    fn fallback_selector_is_used_when_first_misses() {
        let html = Html::parse_document("<ul><li class=\"b\">x</li></ul>");
        let set =
            SelectorSet::compile("items", &["li.a".to_string(), "li.b".to_string()]).unwrap();
        assert_eq!(set.select_document(&html).len(), 1);
    }

    #[test]
    fn counts_and_text_normalisation() {
        assert_eq!(parse_count("12,345"), Some(12_345));
        assert_eq!(parse_count(" 7 "), Some(7));
        assert_eq!(parse_count("n/a"), None);

        let html = Html::parse_document("<p>  Hello \n  <b>world</b> </p>");
        let p = Selector::parse("p").unwrap();
        let element = html.select(&p).next().unwrap();
        assert_eq!(element_text(element), "Hello world");
    }
}
