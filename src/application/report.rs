//! Report shapes for aggregates
//!
//! `StatsReport` carries summary counts, a bounded ranking per category and
//! row-oriented data for tabular export. Everything is `Serialize` so an
//! export layer can write it verbatim.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::top_k::{FrequencyQueue, RankedEntry, interleave_rows, peek_top_k};
use crate::domain::{Aggregate, Category};

/// Column heading for the visit-count ranking
pub const MOST_VISITED_HEADING: &str = "Top fics";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRanking {
    pub category: Category,
    pub heading: String,
    /// Number of distinct values seen
    pub distinct: usize,
    pub entries: Vec<RankedEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    pub total_word_count: u64,
    pub record_count: u64,
    pub works_count: usize,
    pub most_visited: Vec<RankedEntry>,
    pub rankings: Vec<CategoryRanking>,
    /// Two columns (value, count) per ranking, most-visited first
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl StatsReport {
    /// Build a report keeping `top_k` entries per ranking. With
    /// `include_all_rows` the tabular rows cover every value instead of
    /// only the top `top_k`.
    pub fn from_aggregate(aggregate: &Aggregate, top_k: usize, include_all_rows: bool) -> Self {
        let rankings = Category::ALL
            .into_iter()
            .map(|category| {
                let map = aggregate.category(category);
                CategoryRanking {
                    category,
                    heading: category.heading().to_string(),
                    distinct: map.len(),
                    entries: peek_top_k(map, top_k),
                }
            })
            .collect();

        let mut queues: Vec<FrequencyQueue> = std::iter::once(&aggregate.visit_counts)
            .chain(Category::ALL.iter().map(|c| aggregate.category(*c)))
            .map(FrequencyQueue::from_map)
            .collect();
        let mut rows: Vec<Vec<String>> = interleave_rows(&mut queues)
            .into_iter()
            .map(|row| row.into_iter().flat_map(cells).collect())
            .collect();
        if !include_all_rows {
            rows.truncate(top_k);
        }

        let headers = std::iter::once(MOST_VISITED_HEADING)
            .chain(Category::ALL.iter().map(|c| c.heading()))
            .flat_map(|heading| [heading.to_string(), "Count".to_string()])
            .collect();

        Self {
            total_word_count: aggregate.total_word_count,
            record_count: aggregate.record_count,
            works_count: aggregate.works_count(),
            most_visited: peek_top_k(&aggregate.visit_counts, top_k),
            rankings,
            headers,
            rows,
        }
    }

    pub fn ranking(&self, category: Category) -> Option<&CategoryRanking> {
        self.rankings.iter().find(|r| r.category == category)
    }

    /// Plain-text summary for terminals, same as the `Display` output.
    pub fn render_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "===STATS===")?;
        writeln!(f, "Words: {}", self.total_word_count)?;
        writeln!(f, "Works: {}", self.works_count)?;
        for ranking in &self.rankings {
            writeln!(
                f,
                "{}: {}",
                capitalised(&ranking.category.to_string()),
                ranking.distinct
            )?;
        }

        writeln!(f)?;
        writeln!(f, "===TOP===")?;
        write_ranking(f, MOST_VISITED_HEADING, &self.most_visited)?;
        for ranking in &self.rankings {
            write_ranking(f, &ranking.heading, &ranking.entries)?;
        }
        Ok(())
    }
}

fn cells(entry: Option<RankedEntry>) -> [String; 2] {
    match entry {
        Some(entry) => [entry.value, entry.count.to_string()],
        None => [String::new(), String::new()],
    }
}

fn capitalised(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

fn write_ranking(f: &mut fmt::Formatter<'_>, heading: &str, entries: &[RankedEntry]) -> fmt::Result {
    writeln!(f, "{heading}:")?;
    for entry in entries {
        writeln!(f, "  {} ({})", entry.value, entry.count)?;
    }
    writeln!(f)
}
