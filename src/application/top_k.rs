//! Top-K selection over frequency maps
//!
//! `peek_top_k` leaves the map untouched and runs in O(n log k).
//! `FrequencyQueue` is the destructive form: a max-heap drained one entry at
//! a time, used to build row-oriented reports across several categories.
//! Equal counts are ordered by ascending value everywhere.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::domain::{Aggregate, Category, FrequencyMap};

/// One (value, count) pair of a ranking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RankedEntry {
    pub value: String,
    pub count: u64,
}

impl RankedEntry {
    pub fn new(value: impl Into<String>, count: u64) -> Self {
        Self {
            value: value.into(),
            count,
        }
    }
}

/// Greater means ranked higher: larger count, then smaller value.
impl Ord for RankedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.count
            .cmp(&other.count)
            .then_with(|| other.value.cmp(&self.value))
    }
}

impl PartialOrd for RankedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<(String, u64)> for RankedEntry {
    fn from((value, count): (String, u64)) -> Self {
        Self { value, count }
    }
}

/// Non-destructive top-K, best first.
pub fn peek_top_k(map: &FrequencyMap, k: usize) -> Vec<RankedEntry> {
    if k == 0 {
        return Vec::new();
    }

    // min-heap of the k best seen so far
    let mut heap: BinaryHeap<Reverse<RankedEntry>> = BinaryHeap::with_capacity(k + 1);
    for (value, count) in map.iter() {
        let candidate = RankedEntry::new(value, count);
        if heap.len() < k {
            heap.push(Reverse(candidate));
        } else if heap.peek().is_some_and(|Reverse(worst)| candidate > *worst) {
            heap.pop();
            heap.push(Reverse(candidate));
        }
    }

    // ascending Reverse order == descending rank
    heap.into_sorted_vec()
        .into_iter()
        .map(|Reverse(entry)| entry)
        .collect()
}

/// Top-K for every category of an aggregate, in `Category::ALL` order.
pub fn top_k_by_category(aggregate: &Aggregate, k: usize) -> Vec<(Category, Vec<RankedEntry>)> {
    Category::ALL
        .into_iter()
        .map(|category| (category, peek_top_k(aggregate.category(category), k)))
        .collect()
}

/// Destructive max-queue over a frequency map.
#[derive(Debug, Clone, Default)]
pub struct FrequencyQueue {
    heap: BinaryHeap<RankedEntry>,
}

impl FrequencyQueue {
    pub fn from_map(map: &FrequencyMap) -> Self {
        map.iter().map(|(value, count)| RankedEntry::new(value, count)).collect()
    }

    /// Remove and return the highest-ranked entry; `None` once drained.
    pub fn pop_max(&mut self) -> Option<RankedEntry> {
        self.heap.pop()
    }

    /// Remove up to `k` entries, best first. Returns fewer when the queue
    /// runs out.
    pub fn pop_top_k(&mut self, k: usize) -> Vec<RankedEntry> {
        std::iter::from_fn(|| self.pop_max()).take(k).collect()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl From<FrequencyMap> for FrequencyQueue {
    fn from(map: FrequencyMap) -> Self {
        map.into_iter().map(RankedEntry::from).collect()
    }
}

impl FromIterator<RankedEntry> for FrequencyQueue {
    fn from_iter<I: IntoIterator<Item = RankedEntry>>(iter: I) -> Self {
        Self {
            heap: iter.into_iter().collect(),
        }
    }
}

/// Drain the queues row by row: row i holds the i-th best entry of each
/// queue, with `None` where a queue is already exhausted.
pub fn interleave_rows(queues: &mut [FrequencyQueue]) -> Vec<Vec<Option<RankedEntry>>> {
    let longest = queues.iter().map(FrequencyQueue::len).max().unwrap_or(0);
    (0..longest)
        .map(|_| queues.iter_mut().map(FrequencyQueue::pop_max).collect())
        .collect()
}
