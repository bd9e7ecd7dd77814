//! Interest posting reconciliation and tax withholding.
//!
//! Converts computed posting periods into actual ledger transactions.
//! Matching is by posting date: an existing transaction with the right
//! amount is left alone; a wrong one is reversed and recreated with the
//! corrected amount, never edited in place. A second pass against an
//! unchanged ledger therefore produces zero corrections, which is how
//! repeated invocation stays idempotent.

use crate::interest::PostingPeriod;
use crate::ledger::TransactionLedger;
use crate::money::Money;
use crate::transaction::TransactionKind;
use chrono::NaiveDate;
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One component of a withholding tax split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxComponent {
    /// Component name, e.g. a state or federal share.
    pub name: String,

    /// Share of the taxed amount, in percentage points.
    pub percentage: Decimal,
}

/// The configured set of tax components applied to posted interest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxGroup {
    /// Components in application order.
    pub components: Vec<TaxComponent>,
}

impl TaxGroup {
    /// Sum of all component percentages.
    pub fn total_percentage(&self) -> Decimal {
        self.components.iter().map(|c| c.percentage).sum()
    }

    /// Tax withheld on `amount`: each component's share is rounded to the
    /// currency scale individually, then summed.
    pub fn tax_on(&self, amount: Money) -> Money {
        self.components
            .iter()
            .fold(Money::zero(amount.currency()), |acc, component| {
                acc + amount
                    .multiplied_by(component.percentage / Decimal::ONE_HUNDRED)
                    .rounded()
            })
    }
}

/// Reconciles computed posting periods against the ledger.
///
/// For each period, the posting transaction on the period's posting date is
/// created, confirmed, or replaced (reverse + recreate) so that the ledger
/// carries exactly the computed amount. The sign of the computed interest
/// selects the transaction kind: interest posting for credits, overdraft
/// interest for charges.
///
/// Returns `true` if the ledger changed, in which case the caller must
/// re-run balance recalculation before trusting derived fields.
pub fn apply_interest_postings(
    ledger: &mut TransactionLedger,
    periods: &[PostingPeriod],
) -> bool {
    let mut changed = false;

    // A posting whose date no computed period posts to is stale: typically a
    // partial-period posting left behind after the as-of date advanced.
    let posting_dates: BTreeSet<NaiveDate> = periods.iter().map(|p| p.posting_date).collect();
    let stale: Vec<(u64, NaiveDate)> = ledger
        .iter_active()
        .filter(|tx| tx.kind.is_interest() && !posting_dates.contains(&tx.date))
        .map(|tx| (tx.id, tx.date))
        .collect();
    for (id, date) in stale {
        ledger.reverse_transaction(id);
        debug!("reversed stale interest tx {id} on {date}: no period posts there");
        changed = true;
    }

    for period in periods {
        let date = period.posting_date;
        let computed = period.interest_to_post();
        let desired = if computed.is_positive() {
            Some((TransactionKind::InterestPosting, computed))
        } else if computed.is_negative() {
            Some((TransactionKind::OverdraftInterest, computed.abs()))
        } else {
            None
        };

        let existing = ledger
            .iter_active()
            .find(|tx| tx.kind.is_interest() && tx.date == date)
            .map(|tx| (tx.id, tx.kind, tx.amount));

        match (existing, desired) {
            (None, None) => {}
            (None, Some((kind, amount))) => {
                let id = ledger.append(kind, date, amount);
                debug!("posted {amount} interest on {date} as tx {id}");
                changed = true;
            }
            (Some((id, _, _)), None) => {
                ledger.reverse_transaction(id);
                debug!("reversed interest tx {id} on {date}: recomputed to zero");
                changed = true;
            }
            (Some((id, kind, amount)), Some((want_kind, want_amount))) => {
                if kind == want_kind && amount == want_amount {
                    continue;
                }
                ledger.reverse_transaction(id);
                let new_id = ledger.append(want_kind, date, want_amount);
                debug!(
                    "corrected interest on {date}: reversed tx {id} ({amount}), \
                     recreated as tx {new_id} ({want_amount})"
                );
                changed = true;
            }
        }
    }

    changed
}

/// Reconciles the single withholding transaction against total interest
/// posted to date.
///
/// The expected withholding is derived from the ledger's live interest
/// postings and dated `posting_date` (the last period boundary). A matching
/// existing transaction is a no-op; anything else is reversed and the
/// expected transaction recreated. Returns `true` if the ledger changed.
pub fn apply_tax_withholding(
    ledger: &mut TransactionLedger,
    tax_group: &TaxGroup,
    posting_date: NaiveDate,
) -> bool {
    let total_interest = ledger.total_interest_posted();
    let expected = if total_interest.is_positive() {
        let tax = tax_group.tax_on(total_interest);
        if tax.is_positive() { Some(tax) } else { None }
    } else {
        None
    };

    let existing: Vec<(u64, NaiveDate, Money)> = ledger
        .iter_active()
        .filter(|tx| tx.kind == TransactionKind::WithholdTax)
        .map(|tx| (tx.id, tx.date, tx.amount))
        .collect();

    if let (Some(tax), [(_, date, amount)]) = (expected, existing.as_slice()) {
        if *date == posting_date && *amount == tax {
            return false;
        }
    }
    if expected.is_none() && existing.is_empty() {
        return false;
    }

    for (id, date, amount) in existing {
        ledger.reverse_transaction(id);
        debug!("reversed stale withholding tx {id} ({amount} on {date})");
    }
    if let Some(tax) = expected {
        let id = ledger.append(TransactionKind::WithholdTax, posting_date, tax);
        debug!("withheld {tax} tax on {posting_date} as tx {id}");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interest::{
        CompoundingFrequency, DaysInYear, InterestCalculationMethod, InterestParams,
    };
    use crate::interval::DateInterval;
    use crate::money::Currency;
    use std::str::FromStr;

    fn usd() -> Currency {
        Currency::new("USD", 2).unwrap()
    }

    fn money(s: &str) -> Money {
        Money::new(usd(), Decimal::from_str(s).unwrap())
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> chrono::NaiveDate {
        chrono::NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn compute_period(ledger: &TransactionLedger, from: chrono::NaiveDate, to: chrono::NaiveDate, rate: &str) -> PostingPeriod {
        let params = InterestParams {
            rate_fraction: dec(rate),
            overdraft_rate_fraction: dec("0.18"),
            days_in_year: DaysInYear::Days365,
            compounding: CompoundingFrequency::Monthly,
            method: InterestCalculationMethod::DailyBalance,
            min_balance_for_interest: Money::zero(usd()),
            financial_year_start_month: 1,
        };
        PostingPeriod::create_from(
            DateInterval::new(from, to),
            false,
            Money::zero(usd()),
            ledger.transactions(),
            &params,
            to,
        )
    }

    #[test]
    fn test_posting_appends_then_is_idempotent() {
        let mut ledger = TransactionLedger::new(usd());
        ledger.append(TransactionKind::Deposit, d(2024, 1, 1), money("1000"));
        let period = compute_period(&ledger, d(2024, 1, 1), d(2024, 1, 31), "0.05");

        let changed = apply_interest_postings(&mut ledger, std::slice::from_ref(&period));
        assert!(changed);
        assert_eq!(
            ledger
                .iter_active()
                .filter(|tx| tx.kind == TransactionKind::InterestPosting)
                .count(),
            1
        );

        // Second call against the unchanged ledger: no corrections.
        let changed = apply_interest_postings(&mut ledger, std::slice::from_ref(&period));
        assert!(!changed);
        assert_eq!(ledger.transactions().len(), 2);
    }

    #[test]
    fn test_wrong_amount_is_reversed_and_recreated() {
        let mut ledger = TransactionLedger::new(usd());
        ledger.append(TransactionKind::Deposit, d(2024, 1, 1), money("1000"));
        // A stale posting with the wrong amount.
        ledger.append(TransactionKind::InterestPosting, d(2024, 1, 31), money("9.99"));

        let period = compute_period(&ledger, d(2024, 1, 1), d(2024, 1, 31), "0.05");
        let changed = apply_interest_postings(&mut ledger, std::slice::from_ref(&period));
        assert!(changed);

        let live: Vec<_> = ledger
            .iter_active()
            .filter(|tx| tx.kind == TransactionKind::InterestPosting)
            .collect();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].amount, money("4.25"));
        // The stale posting is still in the history, reversed.
        assert!(ledger
            .transactions()
            .iter()
            .any(|tx| tx.reversed && tx.amount == money("9.99")));
    }

    #[test]
    fn test_negative_interest_posts_as_overdraft_kind() {
        let mut ledger = TransactionLedger::new(usd());
        ledger.append(TransactionKind::Withdrawal, d(2024, 1, 1), money("1000"));

        let period = compute_period(&ledger, d(2024, 1, 1), d(2024, 1, 31), "0.05");
        assert!(period.interest_to_post().is_negative());

        apply_interest_postings(&mut ledger, std::slice::from_ref(&period));
        let tx = ledger
            .iter_active()
            .find(|tx| tx.kind == TransactionKind::OverdraftInterest)
            .unwrap();
        assert!(tx.amount.is_positive());
        assert_eq!(tx.date, d(2024, 1, 31));
    }

    #[test]
    fn test_stale_partial_period_posting_is_reversed() {
        let mut ledger = TransactionLedger::new(usd());
        ledger.append(TransactionKind::Deposit, d(2024, 1, 1), money("1000"));

        // Posted while the as-of date still sat mid-month.
        let partial = compute_period(&ledger, d(2024, 1, 1), d(2024, 1, 20), "0.05");
        apply_interest_postings(&mut ledger, std::slice::from_ref(&partial));
        assert!(ledger
            .iter_active()
            .any(|tx| tx.kind == TransactionKind::InterestPosting && tx.date == d(2024, 1, 20)));

        // The month completes: the mid-month posting is stale and replaced
        // by the full-month one.
        let full = compute_period(&ledger, d(2024, 1, 1), d(2024, 1, 31), "0.05");
        let changed = apply_interest_postings(&mut ledger, std::slice::from_ref(&full));
        assert!(changed);

        let live: Vec<_> = ledger
            .iter_active()
            .filter(|tx| tx.kind.is_interest())
            .collect();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].date, d(2024, 1, 31));
        assert_eq!(live[0].amount, money("4.25"));
    }

    #[test]
    fn test_tax_split_rounds_per_component() {
        let group = TaxGroup {
            components: vec![
                TaxComponent { name: "federal".into(), percentage: dec("7.5") },
                TaxComponent { name: "state".into(), percentage: dec("2.5") },
            ],
        };
        assert_eq!(group.total_percentage(), dec("10"));
        // 7.5% of 10.10 = 0.7575 -> 0.76 (banker's), 2.5% = 0.2525 -> 0.25
        assert_eq!(group.tax_on(money("10.10")), money("1.01"));
    }

    #[test]
    fn test_withholding_created_and_updated() {
        let mut ledger = TransactionLedger::new(usd());
        ledger.append(TransactionKind::InterestPosting, d(2024, 1, 31), money("10"));
        let group = TaxGroup {
            components: vec![TaxComponent { name: "wht".into(), percentage: dec("10") }],
        };

        let changed = apply_tax_withholding(&mut ledger, &group, d(2024, 1, 31));
        assert!(changed);
        let tax = ledger
            .iter_active()
            .find(|tx| tx.kind == TransactionKind::WithholdTax)
            .unwrap();
        assert_eq!(tax.amount, money("1.00"));

        // Idempotent against an unchanged ledger.
        assert!(!apply_tax_withholding(&mut ledger, &group, d(2024, 1, 31)));

        // More interest posted: the withholding moves to the new boundary
        // and covers the new total, replacing the old transaction.
        ledger.append(TransactionKind::InterestPosting, d(2024, 2, 29), money("10"));
        let changed = apply_tax_withholding(&mut ledger, &group, d(2024, 2, 29));
        assert!(changed);
        let live: Vec<_> = ledger
            .iter_active()
            .filter(|tx| tx.kind == TransactionKind::WithholdTax)
            .collect();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].amount, money("2.00"));
        assert_eq!(live[0].date, d(2024, 2, 29));
    }

    #[test]
    fn test_no_withholding_without_posted_interest() {
        let mut ledger = TransactionLedger::new(usd());
        ledger.append(TransactionKind::Deposit, d(2024, 1, 1), money("1000"));
        let group = TaxGroup {
            components: vec![TaxComponent { name: "wht".into(), percentage: dec("10") }],
        };
        assert!(!apply_tax_withholding(&mut ledger, &group, d(2024, 1, 31)));
        assert!(ledger
            .iter_active()
            .all(|tx| tx.kind != TransactionKind::WithholdTax));
    }
}
