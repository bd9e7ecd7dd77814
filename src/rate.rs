//! Interest rate charts and effective-rate resolution.
//!
//! A chart holds amount/tenor-keyed rate slabs valid over an effective date
//! range. Resolution picks the slab applicable to the deposit, applies any
//! premature-closure penalty (floored at zero) and converts percentage
//! points to a fraction at full decimal precision.

use crate::error::{EngineError, Result};
use crate::term::{PeriodFrequencyUnit, PreClosurePenalty};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One tier of a rate chart.
///
/// Bounds are inclusive; `None` means unbounded on that side. The tenor is
/// measured in `period_unit` between the deposit start and close dates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateSlab {
    /// Unit in which `from_period`/`to_period` are expressed.
    pub period_unit: PeriodFrequencyUnit,

    /// Minimum tenor, inclusive.
    pub from_period: u32,

    /// Maximum tenor, inclusive. `None` for open-ended.
    pub to_period: Option<u32>,

    /// Minimum deposit amount, inclusive.
    pub amount_from: Option<Decimal>,

    /// Maximum deposit amount, inclusive. `None` for open-ended.
    pub amount_to: Option<Decimal>,

    /// Annual interest rate in percentage points, e.g. `8.0` for 8%.
    pub annual_rate: Decimal,
}

impl RateSlab {
    /// Returns `true` if this slab covers the given deposit amount and the
    /// tenor spanned by `[start, close]`.
    pub fn matches(&self, amount: Decimal, start: NaiveDate, close: NaiveDate) -> bool {
        if close < start {
            return false;
        }
        let tenor = self.period_unit.periods_between(start, close);
        if tenor < i64::from(self.from_period) {
            return false;
        }
        if let Some(to) = self.to_period {
            if tenor > i64::from(to) {
                return false;
            }
        }
        if let Some(from) = self.amount_from {
            if amount < from {
                return false;
            }
        }
        if let Some(to) = self.amount_to {
            if amount > to {
                return false;
            }
        }
        true
    }
}

/// A tiered interest-rate table with an effective date range.
///
/// # Invariants
///
/// - For any fixed date at most one chart applies to an account.
/// - Slabs within a chart must not overlap in amount range for the same
///   tenor; lookup takes the first match in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestRateChart {
    /// First date on which the chart applies.
    pub from_date: NaiveDate,

    /// Last date on which the chart applies. `None` for open-ended.
    pub end_date: Option<NaiveDate>,

    /// Rate slabs in lookup order.
    pub slabs: Vec<RateSlab>,
}

impl InterestRateChart {
    /// Returns `true` if the chart is effective on the given date.
    pub fn applies_on(&self, date: NaiveDate) -> bool {
        self.from_date <= date && self.end_date.map_or(true, |end| date <= end)
    }

    /// Looks up the annual rate (percentage points) for a deposit.
    pub fn rate_for(&self, amount: Decimal, start: NaiveDate, close: NaiveDate) -> Option<Decimal> {
        self.slabs
            .iter()
            .find(|slab| slab.matches(amount, start, close))
            .map(|slab| slab.annual_rate)
    }
}

/// The window a premature closure is rated over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureWindow {
    /// Closure at or after maturity: rate over the whole deposit term.
    AtMaturity,

    /// Closure before maturity on the given withdrawal date.
    Premature { withdrawal_date: NaiveDate },
}

/// Resolves the effective annual rate, as a fraction, for a deposit.
///
/// With a chart attached, the slab is selected for the deposit amount over
/// the window `[start, close]`, where `close` depends on the closure kind
/// and the penalty policy. A missing slab is a validation failure, never a
/// silent zero. Without a chart the nominal rate is used unmodified.
///
/// For premature closure with a configured penalty, the penalty rate is
/// subtracted from the resolved rate and the result floored at zero.
///
/// The percentage-points-to-fraction division is exact to `rust_decimal`'s
/// 28 significant digits, so repeated postings do not accumulate feedback
/// error.
pub fn resolve_effective_rate(
    chart: Option<&InterestRateChart>,
    nominal_annual_rate: Decimal,
    deposit_amount: Decimal,
    deposit_start: NaiveDate,
    maturity_date: NaiveDate,
    window: ClosureWindow,
    penalty: Option<&PreClosurePenalty>,
) -> Result<Decimal> {
    let close = match window {
        ClosureWindow::AtMaturity => maturity_date,
        ClosureWindow::Premature { withdrawal_date } => match penalty {
            Some(p) => p.rated_close_date(maturity_date, withdrawal_date),
            None => withdrawal_date,
        },
    };

    let mut rate = match chart {
        Some(chart) => chart
            .rate_for(deposit_amount, deposit_start, close)
            .ok_or_else(|| EngineError::NoApplicableRate {
                amount: deposit_amount.to_string(),
            })?,
        None => nominal_annual_rate,
    };

    if matches!(window, ClosureWindow::Premature { .. }) {
        if let Some(p) = penalty {
            rate = (rate - p.penalty_rate).max(Decimal::ZERO);
        }
    }

    Ok(rate / Decimal::ONE_HUNDRED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::PreClosureInterestBasis;
    use std::str::FromStr;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn chart() -> InterestRateChart {
        InterestRateChart {
            from_date: d(2023, 1, 1),
            end_date: None,
            slabs: vec![
                RateSlab {
                    period_unit: PeriodFrequencyUnit::Months,
                    from_period: 1,
                    to_period: Some(6),
                    amount_from: None,
                    amount_to: None,
                    annual_rate: dec("6.5"),
                },
                RateSlab {
                    period_unit: PeriodFrequencyUnit::Months,
                    from_period: 7,
                    to_period: None,
                    amount_from: Some(dec("10000")),
                    amount_to: None,
                    annual_rate: dec("8.0"),
                },
            ],
        }
    }

    #[test]
    fn test_slab_selection_by_tenor_and_amount() {
        let c = chart();
        assert_eq!(
            c.rate_for(dec("5000"), d(2024, 1, 15), d(2024, 7, 14)),
            Some(dec("6.5"))
        );
        assert_eq!(
            c.rate_for(dec("20000"), d(2024, 1, 15), d(2025, 1, 14)),
            Some(dec("8.0"))
        );
        // Long tenor but below the amount floor of the second slab.
        assert_eq!(c.rate_for(dec("5000"), d(2024, 1, 15), d(2025, 1, 14)), None);
    }

    #[test]
    fn test_no_applicable_slab_is_a_failure() {
        let c = chart();
        let err = resolve_effective_rate(
            Some(&c),
            Decimal::ZERO,
            dec("5000"),
            d(2024, 1, 15),
            d(2025, 1, 15),
            ClosureWindow::AtMaturity,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::NoApplicableRate { .. }));
    }

    #[test]
    fn test_nominal_rate_without_chart() {
        let rate = resolve_effective_rate(
            None,
            dec("4.75"),
            dec("1000"),
            d(2024, 1, 1),
            d(2024, 7, 1),
            ClosureWindow::AtMaturity,
            None,
        )
        .unwrap();
        assert_eq!(rate, dec("0.0475"));
    }

    #[test]
    fn test_premature_penalty_floors_at_zero() {
        let penalty = PreClosurePenalty {
            penalty_rate: dec("10.0"),
            interest_basis: PreClosureInterestBasis::WholeTerm,
        };
        let rate = resolve_effective_rate(
            Some(&chart()),
            Decimal::ZERO,
            dec("20000"),
            d(2024, 1, 15),
            d(2025, 1, 15),
            ClosureWindow::Premature {
                withdrawal_date: d(2024, 10, 1),
            },
            Some(&penalty),
        )
        .unwrap();
        // Chart rate 8.0, penalty 10.0: floors at zero, never negative.
        assert_eq!(rate, Decimal::ZERO);
    }

    #[test]
    fn test_till_withdrawal_basis_rates_the_shorter_window() {
        // Till-withdrawal uses the actual withdrawal date, landing in the
        // short-tenor slab; whole-term keeps the long-tenor slab.
        let c = chart();
        let penalty_till = PreClosurePenalty {
            penalty_rate: dec("1.0"),
            interest_basis: PreClosureInterestBasis::TillPrematureWithdrawal,
        };
        let rate = resolve_effective_rate(
            Some(&c),
            Decimal::ZERO,
            dec("20000"),
            d(2024, 1, 15),
            d(2025, 1, 14),
            ClosureWindow::Premature {
                withdrawal_date: d(2024, 4, 1),
            },
            Some(&penalty_till),
        )
        .unwrap();
        assert_eq!(rate, dec("0.055")); // 6.5 - 1.0 = 5.5%

        let penalty_whole = PreClosurePenalty {
            penalty_rate: dec("1.0"),
            interest_basis: PreClosureInterestBasis::WholeTerm,
        };
        let rate = resolve_effective_rate(
            Some(&c),
            Decimal::ZERO,
            dec("20000"),
            d(2024, 1, 15),
            d(2025, 1, 14),
            ClosureWindow::Premature {
                withdrawal_date: d(2024, 4, 1),
            },
            Some(&penalty_whole),
        )
        .unwrap();
        assert_eq!(rate, dec("0.07")); // 8.0 - 1.0 = 7.0%
    }

    #[test]
    fn test_chart_effective_window() {
        let mut c = chart();
        c.end_date = Some(d(2024, 12, 31));
        assert!(c.applies_on(d(2024, 6, 1)));
        assert!(!c.applies_on(d(2025, 1, 1)));
        assert!(!c.applies_on(d(2022, 12, 31)));
    }
}
