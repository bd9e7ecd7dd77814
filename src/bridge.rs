//! Accounting bridge.
//!
//! Journal entries live in an external general ledger. The bridge computes
//! the instructions that system needs to catch up with the account: post
//! instructions for live transactions it has not journaled yet, reverse
//! instructions for journaled transactions that have since been reversed.
//! Transfer markers carry no amount and produce no instruction.

use crate::account::DepositAccount;
use crate::money::Currency;
use crate::transaction::TransactionKind;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// What the general ledger should do with one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeInstruction {
    /// Journal this transaction.
    Post,

    /// Back the previously journaled entry for this transaction out.
    Reverse,
}

/// One journal instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountingBridgeEntry {
    /// Ledger transaction id the instruction refers to.
    pub transaction_id: u64,

    /// Value date of the transaction.
    pub date: NaiveDate,

    /// Transaction type, so the general ledger can pick its account mapping.
    pub kind: TransactionKind,

    /// Signed amount: credits positive, debits negative.
    pub amount: Decimal,

    /// Post or reverse.
    pub instruction: BridgeInstruction,
}

/// The batch of instructions for one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountingBridgeRecord {
    pub account_id: u64,
    pub office_id: u64,
    pub currency: Currency,

    /// Instructions in ledger (date, id) order.
    pub entries: Vec<AccountingBridgeEntry>,
}

/// Builds the instruction batch for `account` against the set of transaction
/// ids the general ledger currently carries.
///
/// The caller maintains the set: executing a post instruction adds the id,
/// executing a reverse instruction removes it. A subsequent call then
/// returns an empty batch.
pub fn build_bridge_record(
    account: &DepositAccount,
    journaled: &HashSet<u64>,
) -> AccountingBridgeRecord {
    let mut entries = Vec::new();

    for tx in account.ledger().transactions() {
        if !tx.kind.is_credit() && !tx.kind.is_debit() {
            continue;
        }
        let instruction = if tx.reversed {
            if !journaled.contains(&tx.id) {
                continue;
            }
            BridgeInstruction::Reverse
        } else {
            if journaled.contains(&tx.id) {
                continue;
            }
            BridgeInstruction::Post
        };
        let amount = if tx.kind.is_credit() {
            tx.amount.amount()
        } else {
            -tx.amount.amount()
        };
        entries.push(AccountingBridgeEntry {
            transaction_id: tx.id,
            date: tx.date,
            kind: tx.kind,
            amount,
            instruction,
        });
    }

    AccountingBridgeRecord {
        account_id: account.id(),
        office_id: account.office_id(),
        currency: account.ledger().currency(),
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountConfig, AccountHolder, DepositAccount};
    use crate::interest::{CompoundingFrequency, DaysInYear, InterestCalculationMethod};
    use crate::money::{Currency, Money};
    use crate::period::PostingFrequency;
    use crate::term::TermStrategy;
    use rust_decimal::Decimal;
    use std::collections::BTreeSet;
    use std::str::FromStr;

    fn usd() -> Currency {
        Currency::new("USD", 2).unwrap()
    }

    fn money(s: &str) -> Money {
        Money::new(usd(), Decimal::from_str(s).unwrap())
    }

    fn d(y: i32, m: u32, day: u32) -> chrono::NaiveDate {
        chrono::NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn active_savings() -> DepositAccount {
        let config = AccountConfig {
            currency: usd(),
            nominal_annual_rate: Decimal::from_str("5").unwrap(),
            compounding: CompoundingFrequency::Monthly,
            posting_frequency: PostingFrequency::Monthly,
            calculation_method: InterestCalculationMethod::DailyBalance,
            days_in_year: DaysInYear::Days365,
            financial_year_start_month: 1,
            lock_in: None,
            min_balance_for_interest: Money::zero(usd()),
            min_required_opening_balance: None,
            overdraft: None,
            withhold_tax: None,
        };
        let mut account = DepositAccount::submit(
            1,
            10,
            AccountHolder::Client(7),
            config,
            TermStrategy::None,
            None,
            Vec::new(),
            d(2023, 12, 20),
        )
        .unwrap();
        account.approve(d(2023, 12, 28), None).unwrap();
        account.activate(d(2024, 1, 1)).unwrap();
        account
    }

    #[test]
    fn test_new_transactions_produce_post_instructions() {
        let mut account = active_savings();
        account
            .deposit(d(2024, 1, 1), money("1000"), d(2024, 1, 1))
            .unwrap();
        account
            .withdraw(d(2024, 1, 10), money("200"), d(2024, 1, 10))
            .unwrap();

        let record = build_bridge_record(&account, &HashSet::new());
        assert_eq!(record.account_id, 1);
        assert_eq!(record.office_id, 10);
        assert_eq!(record.entries.len(), 2);
        assert!(record
            .entries
            .iter()
            .all(|e| e.instruction == BridgeInstruction::Post));
        assert_eq!(record.entries[0].amount, Decimal::from(1000));
        assert_eq!(record.entries[1].amount, Decimal::from(-200));
    }

    #[test]
    fn test_journaled_transactions_are_skipped() {
        let mut account = active_savings();
        let dep = account
            .deposit(d(2024, 1, 1), money("1000"), d(2024, 1, 1))
            .unwrap();
        account
            .withdraw(d(2024, 1, 10), money("200"), d(2024, 1, 10))
            .unwrap();

        let journaled: HashSet<u64> = [dep].into_iter().collect();
        let record = build_bridge_record(&account, &journaled);
        assert_eq!(record.entries.len(), 1);
        assert_eq!(record.entries[0].amount, Decimal::from(-200));
    }

    #[test]
    fn test_reversed_journaled_transaction_produces_reverse_instruction() {
        let mut account = active_savings();
        account
            .deposit(d(2024, 1, 1), money("1000"), d(2024, 1, 1))
            .unwrap();
        account
            .post_interest(d(2024, 1, 31), &BTreeSet::new())
            .unwrap();

        // Journal everything that exists right now.
        let journaled: HashSet<u64> = account
            .ledger()
            .transactions()
            .iter()
            .map(|tx| tx.id)
            .collect();
        assert!(build_bridge_record(&account, &journaled).entries.is_empty());

        // A correcting deposit on the 15th reopens January: the old posting
        // is reversed and a corrected one appended.
        account
            .deposit(d(2024, 1, 15), money("1000"), d(2024, 1, 31))
            .unwrap();
        account
            .post_interest(d(2024, 1, 31), &BTreeSet::new())
            .unwrap();

        let record = build_bridge_record(&account, &journaled);
        let reversals: Vec<_> = record
            .entries
            .iter()
            .filter(|e| e.instruction == BridgeInstruction::Reverse)
            .collect();
        let posts: Vec<_> = record
            .entries
            .iter()
            .filter(|e| e.instruction == BridgeInstruction::Post)
            .collect();
        assert_eq!(reversals.len(), 1);
        // The backdated deposit plus the corrected interest posting.
        assert_eq!(posts.len(), 2);
    }

    #[test]
    fn test_unjournaled_reversed_transaction_is_dropped() {
        let mut account = active_savings();
        account
            .deposit(d(2024, 1, 1), money("1000"), d(2024, 1, 1))
            .unwrap();
        account
            .post_interest(d(2024, 1, 31), &BTreeSet::new())
            .unwrap();
        account
            .deposit(d(2024, 1, 15), money("1000"), d(2024, 1, 31))
            .unwrap();
        account
            .post_interest(d(2024, 1, 31), &BTreeSet::new())
            .unwrap();

        // Nothing journaled: the reversed posting never reaches the general
        // ledger at all, only live transactions do.
        let record = build_bridge_record(&account, &HashSet::new());
        assert!(record
            .entries
            .iter()
            .all(|e| e.instruction == BridgeInstruction::Post));
        let posted: Decimal = record.entries.iter().map(|e| e.amount).sum();
        assert_eq!(Money::new(usd(), posted), account.balance());
    }
}
