//! Inclusive date intervals.
//!
//! Posting periods, compounding sub-periods and balance spans are all
//! expressed as closed intervals `[from, to]`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A closed date interval: both endpoints are part of the interval.
///
/// # Invariants
///
/// - `from <= to`; violating this is a programming-contract error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateInterval {
    /// First day of the interval.
    pub from: NaiveDate,

    /// Last day of the interval (inclusive).
    pub to: NaiveDate,
}

impl DateInterval {
    /// Creates an interval. `from` must not be after `to`.
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        debug_assert!(from <= to, "interval start {from} after end {to}");
        DateInterval { from, to }
    }

    /// Number of days in the interval, counting both endpoints.
    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    /// Returns `true` if the date falls within the interval.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    /// Returns `true` if `other` lies entirely within this interval.
    pub fn contains_interval(&self, other: &DateInterval) -> bool {
        self.from <= other.from && other.to <= self.to
    }
}

impl fmt::Display for DateInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} .. {}]", self.from, self.to)
    }
}
