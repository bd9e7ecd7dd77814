//! An interest-bearing deposit-account engine.
//!
//! Models savings, fixed-deposit and recurring-deposit accounts around a
//! reversal-safe transaction ledger: corrections always reverse and
//! recreate, never edit, so the account's history stays audit-complete and
//! every derived figure can be recomputed from scratch at any time.
//!
//! The main entry point is [`DepositAccount`]. A typical savings flow:
//!
//! ```
//! use chrono::NaiveDate;
//! use deposit_engine::{
//!     AccountConfig, AccountHolder, CompoundingFrequency, Currency, DaysInYear,
//!     DepositAccount, InterestCalculationMethod, Money, PostingFrequency, TermStrategy,
//! };
//! use rust_decimal::Decimal;
//! use std::collections::BTreeSet;
//! use std::str::FromStr;
//!
//! # fn main() -> deposit_engine::Result<()> {
//! let usd = Currency::new("USD", 2).unwrap();
//! let config = AccountConfig {
//!     currency: usd,
//!     nominal_annual_rate: Decimal::from_str("5").unwrap(),
//!     compounding: CompoundingFrequency::Monthly,
//!     posting_frequency: PostingFrequency::Monthly,
//!     calculation_method: InterestCalculationMethod::DailyBalance,
//!     days_in_year: DaysInYear::Days365,
//!     financial_year_start_month: 1,
//!     lock_in: None,
//!     min_balance_for_interest: Money::zero(usd),
//!     min_required_opening_balance: None,
//!     overdraft: None,
//!     withhold_tax: None,
//! };
//!
//! let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
//! let mut account = DepositAccount::submit(
//!     1, 1, AccountHolder::Client(1), config, TermStrategy::None, None,
//!     Vec::new(), date(2023, 12, 20),
//! )?;
//! account.approve(date(2023, 12, 28), None)?;
//! account.activate(date(2024, 1, 1))?;
//! account.deposit(date(2024, 1, 1), Money::new(usd, Decimal::from(1000)), date(2024, 1, 1))?;
//! account.post_interest(date(2024, 1, 31), &BTreeSet::new())?;
//! assert_eq!(account.balance().to_string(), "USD 1004.25");
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod bridge;
pub mod error;
pub mod interest;
pub mod interval;
pub mod ledger;
pub mod lifecycle;
pub mod money;
pub mod period;
pub mod posting;
pub mod rate;
pub mod term;
pub mod transaction;

pub use account::{
    AccountConfig, AccountHolder, Charge, ChargeTime, ClosureOutcome, DepositAccount, LockIn,
    OverdraftConfig,
};
pub use bridge::{build_bridge_record, AccountingBridgeEntry, AccountingBridgeRecord, BridgeInstruction};
pub use error::{EngineError, Result, ValidationError};
pub use interest::{
    CompoundingFrequency, DaysInYear, InterestCalculationMethod, InterestParams, PostingPeriod,
};
pub use interval::DateInterval;
pub use ledger::TransactionLedger;
pub use lifecycle::{AccountStatus, BlockState, SubStatus};
pub use money::{Currency, CurrencyCode, Money};
pub use period::{split_posting_periods, PostingFrequency, PostingPeriodInterval};
pub use posting::{apply_interest_postings, apply_tax_withholding, TaxComponent, TaxGroup};
pub use rate::{resolve_effective_rate, ClosureWindow, InterestRateChart, RateSlab};
pub use term::{
    OnClosureAction, PeriodFrequencyUnit, PreClosureInterestBasis, PreClosurePenalty,
    RecurringDetail, RecurringInstallment, TermAndPreClosure, TermStrategy,
};
pub use transaction::{Transaction, TransactionKind};
