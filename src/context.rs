//! Explicit query context threaded through compilation and write planning.

use chrono::{NaiveDateTime, SubsecRound, Utc};

/// Per-call context: point in time for reads, write clock, fast-update mode.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QueryContext {
    /// Read versioned entities as of this instant; `None` reads the open interval.
    pub point_in_time: Option<NaiveDateTime>,
    /// Write clock; `None` uses the current UTC time.
    pub now: Option<NaiveDateTime>,
    /// Correct bitemporal rows in place instead of opening a new interval.
    pub fast_update: bool,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(point_in_time: NaiveDateTime) -> Self {
        Self {
            point_in_time: Some(point_in_time),
            ..Self::default()
        }
    }

    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = Some(now);
        self
    }

    pub fn with_fast_update(mut self, fast_update: bool) -> Self {
        self.fast_update = fast_update;
        self
    }

    /// Timestamp used to close and open validity intervals, truncated to seconds.
    pub fn write_timestamp(&self) -> NaiveDateTime {
        self.now
            .unwrap_or_else(|| Utc::now().naive_utc())
            .trunc_subsecs(0)
    }
}
