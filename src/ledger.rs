//! The transaction ledger and balance recalculation.
//!
//! An account owns one ledger: an ordered, append-mostly collection of
//! transactions. Recalculation replays the ledger forward to assign running
//! and overdraft balances, then backward to assign each transaction's
//! balance span (the days for which its balance held). It is a pure
//! function over a consistent ledger and safe to re-run at any time.

use crate::money::{Currency, Money};
use crate::transaction::{Transaction, TransactionKind};
use chrono::{Days, NaiveDate};
use log::warn;
use serde::{Deserialize, Serialize};

/// Ordered collection of transactions belonging to one account.
///
/// # Invariants
///
/// - All transactions share the ledger currency.
/// - Ids are assigned in creation order and never reused.
/// - Transactions are never removed, only marked reversed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionLedger {
    currency: Currency,
    transactions: Vec<Transaction>,
    next_id: u64,
}

impl TransactionLedger {
    /// Creates an empty ledger in the given currency.
    pub fn new(currency: Currency) -> Self {
        TransactionLedger {
            currency,
            transactions: Vec::new(),
            next_id: 1,
        }
    }

    /// The ledger currency.
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// All transactions, including reversed ones, in (date, id) order.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Iterates non-reversed transactions in (date, id) order.
    pub fn iter_active(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(|tx| !tx.reversed)
    }

    /// Appends a new transaction and returns its id.
    pub fn append(&mut self, kind: TransactionKind, date: NaiveDate, amount: Money) -> u64 {
        debug_assert_eq!(amount.currency(), self.currency);
        let id = self.next_id;
        self.next_id += 1;
        self.transactions.push(Transaction::new(id, kind, date, amount));
        self.sort();
        id
    }

    /// Reverses the transaction with the given id. Returns `false` if no
    /// live transaction with that id exists.
    pub fn reverse_transaction(&mut self, id: u64) -> bool {
        match self
            .transactions
            .iter_mut()
            .find(|tx| tx.id == id && !tx.reversed)
        {
            Some(tx) => {
                tx.reverse();
                true
            }
            None => false,
        }
    }

    /// Current balance: sum of signed amounts of all live transactions.
    pub fn balance(&self) -> Money {
        self.iter_active()
            .fold(Money::zero(self.currency), |acc, tx| acc + tx.signed_amount())
    }

    /// Date of the latest live transaction, if any.
    pub fn last_transaction_date(&self) -> Option<NaiveDate> {
        self.iter_active().map(|tx| tx.date).max()
    }

    /// Total interest posted to date: credited postings minus overdraft
    /// interest charges, over live transactions only.
    pub fn total_interest_posted(&self) -> Money {
        self.iter_active().fold(Money::zero(self.currency), |acc, tx| {
            match tx.kind {
                TransactionKind::InterestPosting => acc + tx.amount,
                TransactionKind::OverdraftInterest => acc - tx.amount,
                _ => acc,
            }
        })
    }

    fn sort(&mut self) {
        self.transactions.sort_by_key(|tx| (tx.date, tx.id));
    }

    /// Replays the ledger to repopulate every derived field.
    ///
    /// Forward pass: accumulates a running balance from `opening_balance`,
    /// assigning each live transaction its balance-after and the portion of
    /// it that fell below zero. A transaction whose previously recorded
    /// overdraft amount disagrees with the recomputed one is reversed and
    /// recreated with the corrected amount rather than edited in place.
    ///
    /// Backward pass: assigns each live non-interest transaction the last
    /// date its balance held (the day before the next such transaction,
    /// bounded by `as_of`), the inclusive day count, and the cumulative
    /// balance (running balance times days held).
    ///
    /// Returns `true` if any correction was created, in which case callers
    /// holding previously computed posting periods must recompute them.
    pub fn recalculate_balances(&mut self, opening_balance: Money, as_of: NaiveDate) -> bool {
        let mut corrected_any = false;
        loop {
            self.sort();
            let corrections = self.forward_pass(opening_balance);
            if corrections.is_empty() {
                break;
            }
            corrected_any = true;
            for (id, kind, date, amount) in corrections {
                self.reverse_transaction(id);
                let new_id = self.append(kind, date, amount);
                warn!(
                    "overdraft correction: reversed tx {id}, recreated as tx {new_id} on {date}"
                );
            }
        }
        self.backward_pass(as_of);
        corrected_any
    }

    /// Forward running-balance pass. Returns the transactions that need an
    /// overdraft correction as (id, kind, date, amount) tuples.
    fn forward_pass(
        &mut self,
        opening_balance: Money,
    ) -> Vec<(u64, TransactionKind, NaiveDate, Money)> {
        let zero = Money::zero(self.currency);
        let mut running = opening_balance;
        let mut corrections = Vec::new();

        for tx in &mut self.transactions {
            if tx.reversed {
                tx.zero_derived_fields();
                continue;
            }
            if !tx.kind.is_credit() && !tx.kind.is_debit() {
                // Markers record the balance at their point in the history.
                tx.running_balance = running;
                continue;
            }

            running += tx.signed_amount();
            tx.running_balance = running;

            let overdraft = if running.is_negative() {
                let underwater = running.negated();
                if tx.kind.is_debit() {
                    underwater.min(tx.amount)
                } else {
                    underwater
                }
            } else {
                zero
            };

            match tx.overdraft_amount {
                None => tx.overdraft_amount = Some(overdraft),
                Some(stored) if stored == overdraft => {}
                Some(_) => corrections.push((tx.id, tx.kind, tx.date, tx.amount)),
            }
        }

        corrections
    }

    /// Backward balance-span pass. Interest postings keep their running
    /// balance but carry no span; the span of the preceding non-interest
    /// transaction runs through them.
    fn backward_pass(&mut self, as_of: NaiveDate) {
        let mut end_of_balance = as_of;
        for tx in self.transactions.iter_mut().rev() {
            if tx.reversed || !tx.affects_balance() || tx.kind.is_interest() {
                continue;
            }
            tx.update_balance_span(end_of_balance.min(as_of));
            end_of_balance = match tx.date.checked_sub_days(Days::new(1)) {
                Some(prev) => prev,
                None => break,
            };
        }
    }
}
