//! Error types for the deposit engine.
//!
//! Three families, per the engine's error design: configuration problems
//! accumulate into a batch of [`ValidationError`]s scoped to one logical
//! operation; temporal and state violations fail fast with a single specific
//! error. Arithmetic reconciliation never errors — it self-corrects and is
//! observable only through the recalculation flag returned by posting.

use crate::lifecycle::AccountStatus;
use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// A single configuration validation failure.
///
/// Collected into a list so that one activation/submission attempt reports
/// every problem at once rather than the first one found.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{parameter}: {message}")]
pub struct ValidationError {
    /// The configuration parameter at fault.
    pub parameter: &'static str,

    /// Human-readable description of the failure.
    pub message: String,
}

impl ValidationError {
    /// Creates a validation error for a named parameter.
    pub fn new(parameter: &'static str, message: impl Into<String>) -> Self {
        ValidationError {
            parameter,
            message: message.into(),
        }
    }
}

/// Errors that can occur during engine operation.
#[derive(Error, Debug)]
pub enum EngineError {
    /// One or more configuration validation failures, reported together.
    #[error("validation failed with {} error(s)", .0.len())]
    Validation(Vec<ValidationError>),

    /// Transaction dated before the account was activated.
    #[error("transaction date {date} is before activation date {activated_on}")]
    TransactionBeforeActivation {
        date: NaiveDate,
        activated_on: NaiveDate,
    },

    /// Transaction dated after the supplied business date.
    #[error("transaction date {date} is in the future (business date {business_date})")]
    FutureTransactionDate {
        date: NaiveDate,
        business_date: NaiveDate,
    },

    /// Transaction dated after a term deposit's maturity date.
    #[error("transaction date {date} is after maturity date {maturity_date}")]
    TransactionAfterMaturity {
        date: NaiveDate,
        maturity_date: NaiveDate,
    },

    /// Closure requested before the account's last transaction.
    #[error("closure date {date} is before last transaction date {last_transaction_date}")]
    ClosureBeforeLastTransaction {
        date: NaiveDate,
        last_transaction_date: NaiveDate,
    },

    /// Operation attempted in a lifecycle state that forbids it.
    #[error("operation `{operation}` not allowed while account is {status}")]
    InvalidAccountState {
        operation: &'static str,
        status: AccountStatus,
    },

    /// Credits (deposits) are blocked on this account.
    #[error("credits are blocked on this account")]
    CreditsBlocked,

    /// Debits (withdrawals) are blocked on this account.
    #[error("debits are blocked on this account")]
    DebitsBlocked,

    /// All transactions are blocked on this account.
    #[error("account is blocked for all transactions")]
    AccountBlocked,

    /// Withdrawal attempted during the lock-in period.
    #[error("withdrawals are locked in until {until}")]
    LockInActive { until: NaiveDate },

    /// Debit would take the balance below what the account allows.
    #[error("insufficient balance: balance {balance} cannot cover {requested}")]
    InsufficientBalance { balance: String, requested: String },

    /// Debit would exceed the configured overdraft limit.
    #[error("overdraft limit {limit} exceeded")]
    OverdraftLimitExceeded { limit: String },

    /// No rate-chart slab matches the deposit amount and tenor.
    #[error("no applicable interest rate for amount {amount} over the deposit period")]
    NoApplicableRate { amount: String },
}

impl EngineError {
    /// Wraps a non-empty list of validation failures.
    pub fn validation(errors: Vec<ValidationError>) -> Self {
        debug_assert!(!errors.is_empty());
        EngineError::Validation(errors)
    }
}
