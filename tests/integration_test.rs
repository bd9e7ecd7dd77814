//! End-to-end flows through the public API: savings with quarterly posting
//! and withholding tax, a fixed deposit held to maturity, a recurring
//! deposit paid to term, and the accounting-bridge catch-up cycle.

use chrono::NaiveDate;
use deposit_engine::{
    build_bridge_record, AccountConfig, AccountHolder, AccountStatus, BridgeInstruction,
    ClosureOutcome, CompoundingFrequency, Currency, DaysInYear, DepositAccount,
    InterestCalculationMethod, Money, OnClosureAction, PeriodFrequencyUnit, PostingFrequency,
    RecurringDetail, TaxComponent, TaxGroup, TermAndPreClosure, TermStrategy, TransactionKind,
};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashSet};
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

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn config(rate: &str) -> AccountConfig {
    AccountConfig {
        currency: usd(),
        nominal_annual_rate: dec(rate),
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
    }
}

fn submit_and_activate(
    id: u64,
    config: AccountConfig,
    term: TermStrategy,
    activated_on: NaiveDate,
) -> DepositAccount {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut account = DepositAccount::submit(
        id,
        1,
        AccountHolder::Client(42),
        config,
        term,
        None,
        Vec::new(),
        activated_on,
    )
    .unwrap();
    account.approve(activated_on, Some("officer-9".into())).unwrap();
    account.activate(activated_on).unwrap();
    account
}

#[test]
fn test_savings_quarterly_posting_with_withholding_tax() {
    let mut cfg = config("5");
    cfg.posting_frequency = PostingFrequency::Quarterly;
    cfg.withhold_tax = Some(TaxGroup {
        components: vec![TaxComponent {
            name: "wht".into(),
            percentage: dec("10"),
        }],
    });
    let tax_group = cfg.withhold_tax.clone().unwrap();
    let mut account = submit_and_activate(1, cfg, TermStrategy::None, d(2024, 1, 1));

    account
        .deposit(d(2024, 1, 1), money("10000"), d(2024, 1, 1))
        .unwrap();
    account
        .withdraw(d(2024, 2, 15), money("2000"), d(2024, 2, 15))
        .unwrap();

    let changed = account
        .post_interest(d(2024, 3, 31), &BTreeSet::new())
        .unwrap();
    assert!(changed);

    // One quarterly posting, compounded monthly inside the quarter.
    let postings: Vec<_> = account
        .ledger()
        .iter_active()
        .filter(|tx| tx.kind == TransactionKind::InterestPosting)
        .collect();
    assert_eq!(postings.len(), 1);
    assert_eq!(postings[0].date, d(2024, 3, 31));
    let total_interest = account.ledger().total_interest_posted();
    assert!(total_interest.is_positive());

    // Withholding matches the configured split of total posted interest.
    let tax: Vec<_> = account
        .ledger()
        .iter_active()
        .filter(|tx| tx.kind == TransactionKind::WithholdTax)
        .collect();
    assert_eq!(tax.len(), 1);
    assert_eq!(tax[0].amount, tax_group.tax_on(total_interest));
    let tax_amount = tax[0].amount;

    // Re-running the posting changes nothing.
    assert!(!account
        .post_interest(d(2024, 3, 31), &BTreeSet::new())
        .unwrap());

    // The balance is exactly the sum of live signed transactions.
    assert_eq!(
        account.balance(),
        money("8000") + total_interest - tax_amount
    );
}

#[test]
fn test_fixed_deposit_held_to_maturity_transfers_out() {
    let term = TermStrategy::Fixed(TermAndPreClosure::new(
        money("10000"),
        6,
        PeriodFrequencyUnit::Months,
        None,
        OnClosureAction::TransferToSavings,
    ));
    let mut account = submit_and_activate(2, config("8"), term, d(2024, 1, 15));

    assert_eq!(
        account.term().term().unwrap().maturity_date,
        Some(d(2024, 7, 15))
    );
    assert_eq!(account.balance(), money("10000"));

    let outcome = account.close(d(2024, 7, 15), d(2024, 7, 15)).unwrap();
    let payout = match outcome {
        ClosureOutcome::TransferredToSavings(amount) => amount,
        other => panic!("expected transfer, got {other:?}"),
    };
    assert!(payout > money("10000"));

    // The realized amount equals the projected maturity amount.
    assert_eq!(account.term().term().unwrap().maturity_amount, Some(payout));

    // A transfer marker records the hand-off; the account ends empty.
    assert!(account
        .ledger()
        .iter_active()
        .any(|tx| tx.kind == TransactionKind::Transfer && tx.amount == payout));
    assert!(account.balance().is_zero());
    assert_eq!(account.status(), AccountStatus::Closed);
}

#[test]
fn test_recurring_deposit_paid_to_term() {
    let term = TermStrategy::Recurring {
        term: TermAndPreClosure::new(
            money("600"),
            6,
            PeriodFrequencyUnit::Months,
            None,
            OnClosureAction::Withdraw,
        ),
        schedule: RecurringDetail::new(money("100"), 1, PeriodFrequencyUnit::Months, true),
    };
    let mut account = submit_and_activate(3, config("6"), term, d(2024, 1, 1));

    // Six installments due on the first of each month before the 2024-07-01
    // maturity.
    let schedule = account.term().schedule().unwrap();
    assert_eq!(schedule.installments.len(), 6);
    assert_eq!(schedule.installments[0].due_date, d(2024, 1, 1));
    assert_eq!(schedule.installments[5].due_date, d(2024, 6, 1));

    for month in 1..=6 {
        let due = d(2024, month, 1);
        account.deposit(due, money("100"), due).unwrap();
    }
    let (overdue, outstanding) = account.overdue_installments(d(2024, 6, 15)).unwrap();
    assert_eq!(overdue, 0);
    assert!(outstanding.is_zero());

    let outcome = account.close(d(2024, 7, 1), d(2024, 7, 1)).unwrap();
    match outcome {
        ClosureOutcome::Withdrawn(amount) => assert!(amount > money("600")),
        other => panic!("expected withdrawal, got {other:?}"),
    }
    assert_eq!(account.status(), AccountStatus::Closed);
}

#[test]
fn test_accounting_bridge_catch_up_cycle() {
    let mut account = submit_and_activate(4, config("5"), TermStrategy::None, d(2024, 1, 1));
    account
        .deposit(d(2024, 1, 1), money("1000"), d(2024, 1, 1))
        .unwrap();
    account
        .post_interest(d(2024, 1, 31), &BTreeSet::new())
        .unwrap();

    // First batch: everything is new.
    let mut journaled: HashSet<u64> = HashSet::new();
    let record = build_bridge_record(&account, &journaled);
    assert_eq!(record.entries.len(), 2);
    assert!(record
        .entries
        .iter()
        .all(|e| e.instruction == BridgeInstruction::Post));
    journaled.extend(record.entries.iter().map(|e| e.transaction_id));

    // Caught up: nothing to do.
    assert!(build_bridge_record(&account, &journaled).entries.is_empty());

    // A backdated deposit reopens January; its posting is corrected.
    account
        .deposit(d(2024, 1, 10), money("1000"), d(2024, 1, 31))
        .unwrap();
    account
        .post_interest(d(2024, 1, 31), &BTreeSet::new())
        .unwrap();

    let record = build_bridge_record(&account, &journaled);
    assert!(record
        .entries
        .iter()
        .any(|e| e.instruction == BridgeInstruction::Reverse
            && e.kind == TransactionKind::InterestPosting));
    assert!(record
        .entries
        .iter()
        .any(|e| e.instruction == BridgeInstruction::Post
            && e.kind == TransactionKind::InterestPosting));
    for entry in &record.entries {
        match entry.instruction {
            BridgeInstruction::Post => {
                journaled.insert(entry.transaction_id);
            }
            BridgeInstruction::Reverse => {
                journaled.remove(&entry.transaction_id);
            }
        }
    }
    assert!(build_bridge_record(&account, &journaled).entries.is_empty());
}
