//! Posting-period splitting.
//!
//! Partitions an account's life from its start date to an as-of date into
//! consecutive, non-overlapping, gap-free intervals at which interest is
//! credited. Boundaries fall on the posting frequency's natural period end
//! (anchored to the financial year start month for non-monthly frequencies)
//! and on any operator-requested manual posting dates.

use crate::interval::DateInterval;
use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How often accrued interest is credited to the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostingFrequency {
    Monthly,
    Quarterly,
    BiAnnual,
    Annual,
}

impl PostingFrequency {
    /// Length of one natural posting period in months.
    pub fn months(&self) -> u32 {
        match self {
            PostingFrequency::Monthly => 1,
            PostingFrequency::Quarterly => 3,
            PostingFrequency::BiAnnual => 6,
            PostingFrequency::Annual => 12,
        }
    }
}

/// One slice of the account's life ending at a posting boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingPeriodInterval {
    /// The date range covered by this period.
    pub interval: DateInterval,

    /// `true` when the period ends on an operator-requested posting date.
    pub user_requested: bool,
}

/// Last day of the month containing `date`.
pub fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
        .expect("first of month is always valid");
    first + Months::new(1) - Days::new(1)
}

/// End of the `step_months`-long period containing `date`, anchored so that
/// one period boundary falls at the end of the month before
/// `financial_year_start_month`. E.g. a 3-month step with an April financial
/// year yields Apr-Jun, Jul-Sep, Oct-Dec, Jan-Mar.
pub fn month_anchored_period_end(
    date: NaiveDate,
    step_months: u32,
    financial_year_start_month: u32,
) -> NaiveDate {
    debug_assert!((1..=12).contains(&financial_year_start_month));
    debug_assert!(step_months >= 1);
    let offset = (date.month() as i64 - financial_year_start_month as i64)
        .rem_euclid(step_months as i64) as u32;
    let months_to_period_end = step_months - 1 - offset;
    last_day_of_month(date + Months::new(months_to_period_end))
}

/// End of the natural posting period containing `date`.
pub fn natural_period_end(
    date: NaiveDate,
    frequency: PostingFrequency,
    financial_year_start_month: u32,
) -> NaiveDate {
    month_anchored_period_end(date, frequency.months(), financial_year_start_month)
}

/// Splits `[start, as_of]` into posting periods.
///
/// The returned intervals are contiguous and gap-free: the first starts at
/// `start`, the last ends at `as_of`, and each next interval starts the day
/// after the previous one ends. A manual posting date always creates a
/// boundary, even mid-period; when it coincides with a natural boundary the
/// two collapse into a single boundary tagged as user-requested.
///
/// Returns an empty list when `start` is after `as_of`.
pub fn split_posting_periods(
    start: NaiveDate,
    as_of: NaiveDate,
    frequency: PostingFrequency,
    financial_year_start_month: u32,
    manual_posting_dates: &BTreeSet<NaiveDate>,
) -> Vec<PostingPeriodInterval> {
    let mut periods = Vec::new();
    let mut cursor = start;

    while cursor <= as_of {
        let natural = natural_period_end(cursor, frequency, financial_year_start_month);
        // Earliest manual date strictly before the natural boundary cuts the
        // period short; one landing exactly on it is the same boundary.
        let end = match manual_posting_dates.range(cursor..natural).next() {
            Some(&manual) => manual,
            None => natural,
        };
        let clipped = end.min(as_of);
        periods.push(PostingPeriodInterval {
            interval: DateInterval::new(cursor, clipped),
            user_requested: manual_posting_dates.contains(&clipped),
        });
        cursor = match clipped.checked_add_days(Days::new(1)) {
            Some(next) => next,
            None => break,
        };
    }

    periods
}
