//! Pagination domain logic centralization.
//!
//! Responsibility:
//! - 0-based page index ↔ 1-based site page number 변환
//! - start_page / max_pages (inclusive) 경계 계산
//! - 마지막 페이지 판정 (politeness delay 생략용)

use serde::{Deserialize, Serialize};

/// Page range to crawl, resolved against the discovered total page count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    /// first 0-based page index to fetch
    pub start_index: u32,
    /// inclusive 0-based index after which the crawl stops, if bounded
    pub max_index: Option<u32>,
    pub total_pages: u32,
}

impl PageRange {
    pub const fn new(start_index: u32, max_index: Option<u32>, total_pages: u32) -> Self {
        Self {
            start_index,
            max_index,
            total_pages,
        }
    }

    /// 0-based index → site page number (1-based)
    pub const fn page_number(index: u32) -> u32 {
        index + 1
    }

    /// One past the last index that will be fetched.
    pub fn end_index(&self) -> u32 {
        let bounded = self
            .max_index
            .map_or(self.total_pages, |max| max.saturating_add(1));
        bounded.min(self.total_pages)
    }

    pub fn indices(&self) -> std::ops::Range<u32> {
        self.start_index..self.end_index().max(self.start_index)
    }

    pub fn page_count(&self) -> u32 {
        self.end_index().saturating_sub(self.start_index)
    }

    pub fn is_empty(&self) -> bool {
        self.page_count() == 0
    }

    /// True when `index` is the last page this range will fetch.
    pub fn is_last(&self, index: u32) -> bool {
        index.saturating_add(1) >= self.end_index()
    }

    /// True when the crawl stopped because of `max_index` rather than
    /// because the history ran out.
    pub fn bounded_by_max(&self) -> bool {
        self.max_index
            .is_some_and(|max| max.saturating_add(1) < self.total_pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inclusive_max_bound() {
        // start 0, max 1 → page index 0,1 → site page 1,2
        let range = PageRange::new(0, Some(1), 10);
        let pages: Vec<u32> = range.indices().map(PageRange::page_number).collect();
        assert_eq!(pages, vec![1, 2]);
        assert!(range.bounded_by_max());
        assert!(range.is_last(1));
        assert!(!range.is_last(0));
    }

    #[test]
    fn test_unbounded_runs_to_total() {
        let range = PageRange::new(2, None, 5);
        assert_eq!(range.indices().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(range.page_count(), 3);
        assert!(!range.bounded_by_max());
    }

    #[test]
    fn test_start_past_total_is_empty() {
        let range = PageRange::new(7, None, 5);
        assert!(range.is_empty());
        assert_eq!(range.indices().count(), 0);
    }

    #[test]
    fn test_max_beyond_total_is_clamped() {
        let range = PageRange::new(0, Some(99), 3);
        assert_eq!(range.end_index(), 3);
        assert!(!range.bounded_by_max());
    }
}
