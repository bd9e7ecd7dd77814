//! Transaction records and their derived balance fields.
//!
//! A transaction is created by a lifecycle operation (deposit, withdrawal,
//! charge, interest posting) and afterwards mutated only by reversal or by
//! balance recomputation. Records are never deleted; corrections reverse the
//! original and append a fresh copy so that transaction identity stays
//! stable for the accounting bridge.

use crate::money::Money;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Transaction type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Funds paid into the account.
    Deposit,

    /// Funds taken out of the account.
    Withdrawal,

    /// Interest credited at a posting boundary.
    InterestPosting,

    /// Interest charged on a negative (overdraft) balance.
    OverdraftInterest,

    /// Tax withheld on posted interest.
    WithholdTax,

    /// A fee or charge debited from the account.
    Charge,

    /// A previously charged fee credited back.
    ChargeWaiver,

    /// Marker recording a funds transfer handled by an external collaborator.
    /// Does not move the balance; the paired deposit/withdrawal does.
    Transfer,

    /// Terminal debit of the full balance when a dormant account is escheated.
    Escheat,
}

impl TransactionKind {
    /// Returns `true` for kinds that increase the balance.
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            TransactionKind::Deposit
                | TransactionKind::InterestPosting
                | TransactionKind::ChargeWaiver
        )
    }

    /// Returns `true` for kinds that decrease the balance.
    pub fn is_debit(&self) -> bool {
        matches!(
            self,
            TransactionKind::Withdrawal
                | TransactionKind::OverdraftInterest
                | TransactionKind::WithholdTax
                | TransactionKind::Charge
                | TransactionKind::Escheat
        )
    }

    /// Returns `true` for the two kinds created by interest posting.
    pub fn is_interest(&self) -> bool {
        matches!(
            self,
            TransactionKind::InterestPosting | TransactionKind::OverdraftInterest
        )
    }

    /// Returns `true` for kinds derived from interest posting, including
    /// the tax withheld on it. Interest calculation ignores these so that
    /// recomputing a period is independent of what has been posted so far.
    pub fn is_interest_related(&self) -> bool {
        self.is_interest() || matches!(self, TransactionKind::WithholdTax)
    }
}

/// One ledger entry belonging to an account.
///
/// # Invariants
///
/// - Non-reversed transactions are totally ordered by `(date, id)`.
/// - Reversed transactions have every derived field zeroed.
/// - `amount` is a positive magnitude; the sign comes from the kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Creation-ordered identifier, unique within one account.
    pub id: u64,

    /// Transaction type.
    pub kind: TransactionKind,

    /// Value date of the transaction.
    pub date: NaiveDate,

    /// Positive transaction amount.
    pub amount: Money,

    /// Set when the transaction has been reversed. Reversed transactions
    /// stay in the ledger but no longer contribute to any balance.
    pub reversed: bool,

    /// Derived: balance immediately after this transaction.
    pub running_balance: Money,

    /// Derived: the portion of this transaction that was below zero after
    /// application. `None` until the first recalculation assigns it; a later
    /// recalculation that disagrees with the stored value triggers a
    /// reverse-and-recreate correction instead of an in-place edit.
    pub overdraft_amount: Option<Money>,

    /// Derived: running balance multiplied by the number of days it held,
    /// used by the daily-balance interest method.
    pub cumulative_balance: Money,

    /// Derived: last day for which this transaction's balance held.
    pub balance_end_date: Option<NaiveDate>,

    /// Derived: inclusive length of the balance span in days.
    pub balance_days: i64,
}

impl Transaction {
    /// Creates a fresh, unreversed transaction with empty derived fields.
    pub fn new(id: u64, kind: TransactionKind, date: NaiveDate, amount: Money) -> Self {
        debug_assert!(!amount.is_negative(), "transaction amounts are magnitudes");
        let currency = amount.currency();
        Transaction {
            id,
            kind,
            date,
            amount,
            reversed: false,
            running_balance: Money::zero(currency),
            overdraft_amount: None,
            cumulative_balance: Money::zero(currency),
            balance_end_date: None,
            balance_days: 0,
        }
    }

    /// Marks this transaction reversed and zeroes all derived fields.
    pub fn reverse(&mut self) {
        self.reversed = true;
        self.zero_derived_fields();
    }

    /// Clears every derived field.
    pub fn zero_derived_fields(&mut self) {
        let currency = self.amount.currency();
        self.running_balance = Money::zero(currency);
        self.overdraft_amount = None;
        self.cumulative_balance = Money::zero(currency);
        self.balance_end_date = None;
        self.balance_days = 0;
    }

    /// Signed effect of this transaction on the balance: positive for
    /// credits, negative for debits, zero for markers.
    pub fn signed_amount(&self) -> Money {
        if self.kind.is_credit() {
            self.amount
        } else if self.kind.is_debit() {
            self.amount.negated()
        } else {
            Money::zero(self.amount.currency())
        }
    }

    /// Returns `true` if this transaction is live (not reversed) and moves
    /// the balance.
    pub fn affects_balance(&self) -> bool {
        !self.reversed && (self.kind.is_credit() || self.kind.is_debit())
    }

    /// Assigns the balance span computed by the backward recalculation pass.
    pub fn update_balance_span(&mut self, end_date: NaiveDate) {
        let days = (end_date - self.date).num_days() + 1;
        if days <= 0 {
            // Superseded on the same day: balance held for no full day.
            self.balance_end_date = None;
            self.balance_days = 0;
            self.cumulative_balance = Money::zero(self.amount.currency());
            return;
        }
        self.balance_end_date = Some(end_date);
        self.balance_days = days;
        self.cumulative_balance = self
            .running_balance
            .multiplied_by(rust_decimal::Decimal::from(days));
    }
}
