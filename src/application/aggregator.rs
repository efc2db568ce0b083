//! Dual-window frequency aggregation
//!
//! One forward pass over the record stream feeds two independent
//! aggregates: all-time and a trailing window. An optional global floor
//! lets the caller stop pulling pages once records become too old.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{Aggregate, HistoryRecord};

/// Time bounds applied while folding records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowPolicy {
    /// Records strictly after this date also count towards the window.
    /// `None` makes the windowed aggregate equal the all-time one.
    pub window_cutoff: Option<NaiveDate>,
    /// Records strictly before this date are ignored entirely.
    pub global_floor: Option<NaiveDate>,
    /// Signal the consumer to stop once a record falls below the floor.
    pub stop_at_floor: bool,
}

impl WindowPolicy {
    pub const fn unbounded() -> Self {
        Self {
            window_cutoff: None,
            global_floor: None,
            stop_at_floor: false,
        }
    }

    pub const fn with_cutoff(cutoff: NaiveDate) -> Self {
        Self {
            window_cutoff: Some(cutoff),
            global_floor: None,
            stop_at_floor: false,
        }
    }

    fn in_window(&self, record: &HistoryRecord) -> bool {
        self.window_cutoff
            .is_none_or(|cutoff| record.visited_after(cutoff))
    }

    fn below_floor(&self, record: &HistoryRecord) -> bool {
        self.global_floor
            .is_some_and(|floor| record.visited_before(floor))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOutcome {
    Folded { in_window: bool },
    BelowFloor,
}

/// 스트리밍 이중 윈도우 집계기
#[derive(Debug, Clone, Default)]
pub struct WindowedAggregator {
    policy: WindowPolicy,
    all_time: Aggregate,
    windowed: Aggregate,
    floor_reached: bool,
}

impl WindowedAggregator {
    pub fn new(policy: WindowPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub const fn policy(&self) -> &WindowPolicy {
        &self.policy
    }

    pub fn fold(&mut self, record: &HistoryRecord) -> FoldOutcome {
        if self.policy.below_floor(record) {
            self.floor_reached = true;
            return FoldOutcome::BelowFloor;
        }

        self.all_time.add_record(record);
        let in_window = self.policy.in_window(record);
        if in_window {
            self.windowed.add_record(record);
        }
        FoldOutcome::Folded { in_window }
    }

    /// True once a record crossed the floor and the policy asks to stop.
    pub const fn should_stop(&self) -> bool {
        self.policy.stop_at_floor && self.floor_reached
    }

    pub const fn floor_reached(&self) -> bool {
        self.floor_reached
    }

    pub const fn all_time(&self) -> &Aggregate {
        &self.all_time
    }

    pub const fn windowed(&self) -> &Aggregate {
        &self.windowed
    }

    /// (all-time, windowed)
    pub fn finish(self) -> (Aggregate, Aggregate) {
        (self.all_time, self.windowed)
    }
}

/// Batch form: fold every record once, producing (all-time, windowed).
pub fn aggregate<'a, I>(records: I, cutoff: Option<NaiveDate>) -> (Aggregate, Aggregate)
where
    I: IntoIterator<Item = &'a HistoryRecord>,
{
    let mut aggregator = WindowedAggregator::new(WindowPolicy {
        window_cutoff: cutoff,
        ..WindowPolicy::unbounded()
    });
    for record in records {
        aggregator.fold(record);
    }
    aggregator.finish()
}
