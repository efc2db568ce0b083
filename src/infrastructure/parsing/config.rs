//! Parsing configuration for HTML extraction
//!
//! Centralized configuration for CSS selectors. Every field holds a list of
//! fallbacks, tried in order, so a markup change can be absorbed from the
//! config file without a rebuild.

use serde::{Deserialize, Serialize};

/// CSS selectors for history listing pages and work pages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySelectors {
    /// Container holding every history entry (structurally required)
    pub history_list: Vec<String>,

    /// One history entry inside the container
    pub history_item: Vec<String>,

    /// Title and author links of an entry
    pub heading_links: Vec<String>,

    /// Fandom tag links of an entry
    pub fandom_links: Vec<String>,

    pub relationship_links: Vec<String>,

    pub freeform_links: Vec<String>,

    /// Word count cell of an entry
    pub word_count: Vec<String>,

    /// Heading carrying "Last visited" and "Visited N times"
    pub viewed_heading: Vec<String>,

    /// Numbered pagination items
    pub pagination_items: Vec<String>,

    /// Hidden CSRF token field on the login form
    pub authenticity_token: Vec<String>,

    pub work: WorkSelectors,
}

/// CSS selectors for a work's own page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkSelectors {
    pub title: Vec<String>,
    pub word_count: Vec<String>,
    pub authors: Vec<String>,
    pub fandoms: Vec<String>,
    pub relationships: Vec<String>,
    pub freeform_tags: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| (*s).to_string()).collect()
}

impl Default for HistorySelectors {
    fn default() -> Self {
        Self {
            history_list: strings(&["ol.reading.work.index.group", "ol.reading"]),
            history_item: strings(&["li[role=\"article\"]", "li.reading.work.blurb"]),
            heading_links: strings(&["h4.heading a"]),
            fandom_links: strings(&["h5.fandoms a", "h5 a"]),
            relationship_links: strings(&["li.relationships a"]),
            freeform_links: strings(&["li.freeforms a"]),
            word_count: strings(&["dd.words"]),
            viewed_heading: strings(&["h4.viewed.heading"]),
            pagination_items: strings(&["ol[title=\"pagination\"] li", "ol.pagination li"]),
            authenticity_token: strings(&["input[name=\"authenticity_token\"]"]),
            work: WorkSelectors::default(),
        }
    }
}

impl Default for WorkSelectors {
    fn default() -> Self {
        Self {
            title: strings(&["h2.title.heading", "h2.title"]),
            word_count: strings(&["dl.stats dd.words", "dd.words"]),
            authors: strings(&["h3.byline a[rel=\"author\"]", "a[rel=\"author\"]"]),
            fandoms: strings(&["dd.fandom.tags a.tag"]),
            relationships: strings(&["dd.relationship.tags a.tag"]),
            freeform_tags: strings(&["dd.freeform.tags a.tag"]),
        }
    }
}
