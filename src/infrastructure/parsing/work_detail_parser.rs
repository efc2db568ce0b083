//! Work page parser used when refreshing record details

use scraper::Html;

use super::config::WorkSelectors;
use super::{SelectorSet, element_text, parse_count};
use crate::domain::{CrawlResult, WorkDetails};

#[derive(Debug, Clone)]
pub struct WorkDetailParser {
    title: SelectorSet,
    word_count: SelectorSet,
    authors: SelectorSet,
    fandoms: SelectorSet,
    relationships: SelectorSet,
    freeform_tags: SelectorSet,
}

impl WorkDetailParser {
    pub fn new(selectors: &WorkSelectors) -> CrawlResult<Self> {
        Ok(Self {
            title: SelectorSet::compile("work.title", &selectors.title)?,
            word_count: SelectorSet::compile("work.word_count", &selectors.word_count)?,
            authors: SelectorSet::compile("work.authors", &selectors.authors)?,
            fandoms: SelectorSet::compile("work.fandoms", &selectors.fandoms)?,
            relationships: SelectorSet::compile("work.relationships", &selectors.relationships)?,
            freeform_tags: SelectorSet::compile("work.freeform_tags", &selectors.freeform_tags)?,
        })
    }

    /// Missing sections yield empty values; a work page never fails to parse.
    pub fn parse(&self, body: &str) -> WorkDetails {
        let html = Html::parse_document(body);
        let texts = |set: &SelectorSet| -> Vec<String> {
            set.select_document(&html)
                .into_iter()
                .map(element_text)
                .filter(|t| !t.is_empty())
                .collect()
        };

        WorkDetails {
            title: self
                .title
                .first_in_document(&html)
                .map(element_text)
                .filter(|t| !t.is_empty()),
            word_count: self
                .word_count
                .first_in_document(&html)
                .and_then(|dd| parse_count(&element_text(dd))),
            authors: texts(&self.authors),
            fandoms: texts(&self.fandoms),
            relationships: texts(&self.relationships),
            freeform_tags: texts(&self.freeform_tags),
        }
    }
}
