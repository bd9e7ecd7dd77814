//! Period interest calculation.
//!
//! For one posting period this module builds compounding sub-periods, walks
//! the end-of-day balance history, applies the day-count convention and
//! produces the interest earned plus a closing balance. Computation ignores
//! previously posted interest transactions; compounding across posting
//! periods flows through the chained closing balance, which is what makes
//! reconciliation against the ledger idempotent.

use crate::interval::DateInterval;
use crate::money::Money;
use crate::period::month_anchored_period_end;
use crate::transaction::Transaction;
use chrono::{Datelike, Days, NaiveDate};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};

/// The denominator used to annualize a periodic rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DaysInYear {
    /// The actual calendar length of the year (365 or 366).
    Actual,

    /// Fixed 360-day year.
    Days360,

    /// Fixed 365-day year.
    Days365,
}

impl DaysInYear {
    /// Denominator for a balance segment starting in `year`.
    pub fn days_for(&self, year: i32) -> Decimal {
        match self {
            DaysInYear::Actual => {
                let leap = NaiveDate::from_ymd_opt(year, 2, 29).is_some();
                if leap {
                    Decimal::from(366)
                } else {
                    Decimal::from(365)
                }
            }
            DaysInYear::Days360 => Decimal::from(360),
            DaysInYear::Days365 => Decimal::from(365),
        }
    }
}

/// How often interest-to-date is folded into the principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompoundingFrequency {
    Daily,
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
}

impl CompoundingFrequency {
    /// Length of one compounding sub-period in months; `None` for daily.
    pub fn months(&self) -> Option<u32> {
        match self {
            CompoundingFrequency::Daily => None,
            CompoundingFrequency::Monthly => Some(1),
            CompoundingFrequency::Quarterly => Some(3),
            CompoundingFrequency::SemiAnnual => Some(6),
            CompoundingFrequency::Annual => Some(12),
        }
    }
}

/// Which balance the periodic rate applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterestCalculationMethod {
    /// Interest on each end-of-day balance for the days it held.
    DailyBalance,

    /// Interest on the day-weighted average balance of each sub-period.
    AverageDailyBalance,
}

/// Everything the calculator needs besides the ledger itself.
#[derive(Debug, Clone)]
pub struct InterestParams {
    /// Effective annual rate as a fraction (e.g. `0.05` for 5%).
    pub rate_fraction: Decimal,

    /// Annual rate charged on negative balances, as a fraction.
    pub overdraft_rate_fraction: Decimal,

    /// Day-count convention.
    pub days_in_year: DaysInYear,

    /// Compounding sub-period length.
    pub compounding: CompoundingFrequency,

    /// Daily-balance or average-daily-balance calculation.
    pub method: InterestCalculationMethod,

    /// End-of-day balances below this earn nothing (but are not charged).
    pub min_balance_for_interest: Money,

    /// Anchor month for non-monthly compounding sub-periods.
    pub financial_year_start_month: u32,
}

/// A balance that held unchanged for a run of days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndOfDayBalance {
    /// First day of the run.
    pub date: NaiveDate,

    /// The end-of-day balance over the run.
    pub balance: Money,

    /// Length of the run in days.
    pub days: i64,
}

/// Result of one compounding sub-period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompoundingPeriodResult {
    /// Date range of the sub-period.
    pub interval: DateInterval,

    /// Interest earned on positive balances (unrounded).
    pub interest: Money,

    /// Interest charged on negative balances, as a positive magnitude.
    pub overdraft_interest: Money,
}

/// Immutable result of computing interest for one posting period.
///
/// Created fresh on every computation pass; never persisted. Purely
/// diagnostic calls consume it without touching the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingPeriod {
    /// Date range covered.
    pub interval: DateInterval,

    /// Balance at the start of the period.
    pub opening_balance: Money,

    /// Balance at the end of the period, excluding this period's interest.
    pub closing_balance: Money,

    /// Net interest for the period: positive-balance interest minus
    /// overdraft charges. Unrounded.
    pub interest_earned: Money,

    /// Per-sub-period breakdown.
    pub compounding_periods: Vec<CompoundingPeriodResult>,

    /// `true` when the period ends on an operator-requested posting date.
    pub user_requested: bool,

    /// Date the posting transaction carries: period end, clipped to as-of.
    pub posting_date: NaiveDate,
}

impl PostingPeriod {
    /// Computes interest for one posting period.
    ///
    /// `transactions` is the full ledger slice; reversed entries, markers
    /// and prior interest postings are ignored here. `opening_balance` is
    /// the previous period's closing balance with its posted interest.
    pub fn create_from(
        interval: DateInterval,
        user_requested: bool,
        opening_balance: Money,
        transactions: &[Transaction],
        params: &InterestParams,
        as_of: NaiveDate,
    ) -> PostingPeriod {
        let currency = opening_balance.currency();
        let relevant: Vec<&Transaction> = transactions
            .iter()
            .filter(|tx| {
                tx.affects_balance()
                    && !tx.kind.is_interest_related()
                    && interval.contains(tx.date)
            })
            .collect();

        let sub_intervals = compounding_intervals(interval, params);

        let mut compounding_periods = Vec::with_capacity(sub_intervals.len());
        let mut sub_opening = opening_balance;
        let mut compounded_interest = Money::zero(currency);
        let mut total_interest = Money::zero(currency);
        let mut total_overdraft = Money::zero(currency);

        for sub in sub_intervals {
            let in_sub: Vec<&Transaction> = relevant
                .iter()
                .copied()
                .filter(|tx| sub.contains(tx.date))
                .collect();
            let balances = end_of_day_balances(sub, sub_opening, &in_sub);

            let result = match params.method {
                InterestCalculationMethod::DailyBalance => {
                    daily_balance_interest(sub, &balances, compounded_interest, params)
                }
                InterestCalculationMethod::AverageDailyBalance => {
                    average_balance_interest(sub, &balances, compounded_interest, params)
                }
            };

            // Interest folds into the principal at each sub-period boundary;
            // overdraft charges never join the compounding base.
            compounded_interest += result.interest;
            total_interest += result.interest;
            total_overdraft += result.overdraft_interest;

            sub_opening = balances
                .last()
                .map(|b| b.balance)
                .unwrap_or(sub_opening);
            compounding_periods.push(result);
        }

        let closing_balance = relevant
            .iter()
            .fold(opening_balance, |acc, tx| acc + tx.signed_amount());

        PostingPeriod {
            interval,
            opening_balance,
            closing_balance,
            interest_earned: total_interest - total_overdraft,
            compounding_periods,
            user_requested,
            posting_date: interval.to.min(as_of),
        }
    }

    /// The amount a posting transaction would carry: net interest rounded
    /// to the currency scale. Sign distinguishes interest posting (positive)
    /// from overdraft interest (negative).
    pub fn interest_to_post(&self) -> Money {
        self.interest_earned.rounded()
    }

    /// Closing balance including this period's posted interest; the next
    /// period's opening balance when this period is an actual posting
    /// boundary.
    pub fn closing_balance_with_interest(&self) -> Money {
        self.closing_balance + self.interest_to_post()
    }
}

/// Splits a posting period into compounding sub-periods.
fn compounding_intervals(interval: DateInterval, params: &InterestParams) -> Vec<DateInterval> {
    let step = match params.compounding.months() {
        // Daily compounding: one sub-period, compounded inside per segment.
        None => return vec![interval],
        Some(step) => step,
    };

    let mut intervals = Vec::new();
    let mut cursor = interval.from;
    while cursor <= interval.to {
        let end = month_anchored_period_end(cursor, step, params.financial_year_start_month)
            .min(interval.to);
        intervals.push(DateInterval::new(cursor, end));
        cursor = match end.checked_add_days(Days::new(1)) {
            Some(next) => next,
            None => break,
        };
    }
    intervals
}

/// Collapses the transactions of one sub-period into runs of constant
/// end-of-day balance.
fn end_of_day_balances(
    interval: DateInterval,
    opening: Money,
    transactions: &[&Transaction],
) -> Vec<EndOfDayBalance> {
    let mut balances = Vec::new();
    let mut segment_start = interval.from;
    let mut balance = opening;

    for tx in transactions {
        debug_assert!(interval.contains(tx.date));
        if tx.date > segment_start {
            balances.push(EndOfDayBalance {
                date: segment_start,
                balance,
                days: (tx.date - segment_start).num_days(),
            });
            segment_start = tx.date;
        }
        balance += tx.signed_amount();
    }

    balances.push(EndOfDayBalance {
        date: segment_start,
        balance,
        days: (interval.to - segment_start).num_days() + 1,
    });
    balances
}

/// Daily-balance method: each balance run earns (or is charged) for the
/// days it held. Daily compounding folds the accrued interest into the base
/// run by run using `(1 + r/diy)^days - 1`.
fn daily_balance_interest(
    interval: DateInterval,
    balances: &[EndOfDayBalance],
    compounded_interest: Money,
    params: &InterestParams,
) -> CompoundingPeriodResult {
    let currency = compounded_interest.currency();
    let mut interest = Money::zero(currency);
    let mut overdraft = Money::zero(currency);
    let daily_compounding = params.compounding == CompoundingFrequency::Daily;

    for run in balances {
        if run.days <= 0 {
            continue;
        }
        let days = Decimal::from(run.days);
        let days_in_year = params.days_in_year.days_for(run.date.year());
        // Within a sub-period interest is simple; only daily compounding
        // folds the interest accrued so far into the base run by run.
        let base = if daily_compounding {
            run.balance + compounded_interest + interest
        } else {
            run.balance + compounded_interest
        };

        if base.is_negative() {
            let charge = base
                .abs()
                .multiplied_by(params.overdraft_rate_fraction * days / days_in_year);
            overdraft += charge;
        } else if base >= params.min_balance_for_interest {
            if daily_compounding {
                let daily_rate = params.rate_fraction / days_in_year;
                let factor = (Decimal::ONE + daily_rate).powi(run.days) - Decimal::ONE;
                interest += base.multiplied_by(factor);
            } else {
                interest += base.multiplied_by(params.rate_fraction * days / days_in_year);
            }
        }
    }

    CompoundingPeriodResult {
        interval,
        interest,
        overdraft_interest: overdraft,
    }
}

/// Average-daily-balance method: one rate application to the day-weighted
/// mean balance of the sub-period.
fn average_balance_interest(
    interval: DateInterval,
    balances: &[EndOfDayBalance],
    compounded_interest: Money,
    params: &InterestParams,
) -> CompoundingPeriodResult {
    let currency = compounded_interest.currency();
    let total_days = interval.days();
    let mut weighted = Money::zero(currency);
    for run in balances {
        weighted += run.balance.multiplied_by(Decimal::from(run.days.max(0)));
    }
    let average = weighted.divided_by(Decimal::from(total_days)) + compounded_interest;

    let days = Decimal::from(total_days);
    let days_in_year = params.days_in_year.days_for(interval.from.year());
    let mut interest = Money::zero(currency);
    let mut overdraft = Money::zero(currency);

    if average.is_negative() {
        overdraft = average
            .abs()
            .multiplied_by(params.overdraft_rate_fraction * days / days_in_year);
    } else if average >= params.min_balance_for_interest {
        interest = average.multiplied_by(params.rate_fraction * days / days_in_year);
    }

    CompoundingPeriodResult {
        interval,
        interest,
        overdraft_interest: overdraft,
    }
}
