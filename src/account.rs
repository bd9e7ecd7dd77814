//! The deposit-account aggregate.
//!
//! Ties the ledger, interest pipeline, term strategy and lifecycle state
//! machine together. Every mutating operation validates state and dates
//! before touching the ledger, and ends by recalculating derived balances,
//! so the account is always consistent between calls.

use crate::error::{EngineError, Result, ValidationError};
use crate::interest::{
    CompoundingFrequency, DaysInYear, InterestCalculationMethod, InterestParams, PostingPeriod,
};
use crate::ledger::TransactionLedger;
use crate::lifecycle::{AccountStatus, BlockState, SubStatus};
use crate::money::{Currency, Money};
use crate::period::{split_posting_periods, PostingFrequency};
use crate::posting::{apply_interest_postings, apply_tax_withholding, TaxGroup};
use crate::rate::{resolve_effective_rate, ClosureWindow, InterestRateChart};
use crate::term::{OnClosureAction, PeriodFrequencyUnit, TermStrategy};
use crate::transaction::TransactionKind;
use chrono::{Days, NaiveDate};
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The single owner of an account: a client or a group, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountHolder {
    Client(u64),
    Group(u64),
}

/// Overdraft facility settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverdraftConfig {
    /// Deepest allowed negative balance, as a positive magnitude.
    pub limit: Decimal,

    /// Annual rate charged on overdrawn balances, in percentage points.
    pub annual_rate: Decimal,
}

/// A lock-in window starting at activation during which withdrawals are
/// refused.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LockIn {
    /// Length of the window in `unit`s.
    pub frequency: u32,

    /// Calendar unit of the window.
    pub unit: PeriodFrequencyUnit,
}

impl LockIn {
    /// First date on which withdrawals are allowed again.
    pub fn end_date(&self, activated_on: NaiveDate) -> NaiveDate {
        self.unit.advance(activated_on, self.frequency)
    }
}

/// Product-level configuration of a deposit account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Account currency; every monetary amount must match it.
    pub currency: Currency,

    /// Annual interest rate in percentage points, used when no rate chart
    /// is attached.
    pub nominal_annual_rate: Decimal,

    /// Compounding sub-period length.
    pub compounding: CompoundingFrequency,

    /// Posting period length.
    pub posting_frequency: PostingFrequency,

    /// Daily-balance or average-daily-balance calculation.
    pub calculation_method: InterestCalculationMethod,

    /// Day-count convention.
    pub days_in_year: DaysInYear,

    /// Month the financial year starts in (1-12); anchors period boundaries.
    pub financial_year_start_month: u32,

    /// Withdrawal lock-in window, if configured.
    pub lock_in: Option<LockIn>,

    /// End-of-day balances below this earn no interest.
    pub min_balance_for_interest: Money,

    /// Minimum size of the opening deposit, if configured.
    pub min_required_opening_balance: Option<Decimal>,

    /// Overdraft facility; without one the balance may not go negative.
    pub overdraft: Option<OverdraftConfig>,

    /// Withholding tax applied to posted interest, if configured.
    pub withhold_tax: Option<TaxGroup>,
}

impl AccountConfig {
    /// Checks the configuration, returning every problem found.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !(1..=12).contains(&self.financial_year_start_month) {
            errors.push(ValidationError::new(
                "financial_year_start_month",
                "must be between 1 and 12",
            ));
        }
        if self.nominal_annual_rate.is_sign_negative() {
            errors.push(ValidationError::new(
                "nominal_annual_rate",
                "must not be negative",
            ));
        }
        if let Some(compounding_months) = self.compounding.months() {
            if self.posting_frequency.months() < compounding_months {
                errors.push(ValidationError::new(
                    "posting_frequency",
                    "posting period must not be shorter than the compounding period",
                ));
            }
        }
        if self.min_balance_for_interest.currency() != self.currency {
            errors.push(ValidationError::new(
                "min_balance_for_interest",
                "currency differs from the account currency",
            ));
        }
        if self.min_balance_for_interest.is_negative() {
            errors.push(ValidationError::new(
                "min_balance_for_interest",
                "must not be negative",
            ));
        }
        if let Some(min) = self.min_required_opening_balance {
            if min.is_sign_negative() {
                errors.push(ValidationError::new(
                    "min_required_opening_balance",
                    "must not be negative",
                ));
            }
        }
        if let Some(overdraft) = &self.overdraft {
            if overdraft.limit.is_sign_negative() {
                errors.push(ValidationError::new("overdraft.limit", "must not be negative"));
            }
            if overdraft.annual_rate.is_sign_negative() {
                errors.push(ValidationError::new(
                    "overdraft.annual_rate",
                    "must not be negative",
                ));
            }
        }
        if let Some(lock_in) = &self.lock_in {
            if lock_in.frequency == 0 {
                errors.push(ValidationError::new(
                    "lock_in.frequency",
                    "must be at least 1",
                ));
            }
        }
        if let Some(tax) = &self.withhold_tax {
            let total = tax.total_percentage();
            if total.is_sign_negative() || total > Decimal::ONE_HUNDRED {
                errors.push(ValidationError::new(
                    "withhold_tax",
                    "component percentages must total between 0 and 100",
                ));
            }
        }

        errors
    }
}

/// When a charge falls due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargeTime {
    /// Collected automatically when the account is activated.
    Activation,

    /// Collected on an explicit pay-charge call on or after this date.
    Specified(NaiveDate),
}

/// A fee attached to the account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Charge {
    pub id: u64,
    pub name: String,
    pub amount: Money,
    pub due: ChargeTime,
    pub paid: bool,
    pub waived: bool,
}

impl Charge {
    pub fn new(id: u64, name: impl Into<String>, amount: Money, due: ChargeTime) -> Self {
        Charge {
            id,
            name: name.into(),
            amount,
            due,
            paid: false,
            waived: false,
        }
    }
}

/// What happened to the balance when an account closed.
///
/// Reinvestment is caller-driven: on [`ClosureOutcome::Reinvest`] the caller
/// opens the follow-up account with [`DepositAccount::reinvestment`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClosureOutcome {
    /// Balance paid out to the holder.
    Withdrawn(Money),

    /// Balance handed to the external funds-transfer collaborator.
    TransferredToSavings(Money),

    /// Balance earmarked for a follow-up deposit account.
    Reinvest(Money),
}

/// A deposit account: ordinary savings, fixed deposit or recurring deposit,
/// depending on the attached [`TermStrategy`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositAccount {
    id: u64,
    office_id: u64,
    holder: AccountHolder,
    config: AccountConfig,
    chart: Option<InterestRateChart>,
    term: TermStrategy,
    charges: Vec<Charge>,
    status: AccountStatus,
    sub_status: SubStatus,
    block: BlockState,
    submitted_on: NaiveDate,
    approved_on: Option<NaiveDate>,
    approved_by: Option<String>,
    activated_on: Option<NaiveDate>,
    closed_on: Option<NaiveDate>,
    ledger: TransactionLedger,
}

impl DepositAccount {
    /// Submits a new account application.
    ///
    /// All configuration problems are collected and reported together as a
    /// single [`EngineError::Validation`].
    #[allow(clippy::too_many_arguments)]
    pub fn submit(
        id: u64,
        office_id: u64,
        holder: AccountHolder,
        config: AccountConfig,
        term: TermStrategy,
        chart: Option<InterestRateChart>,
        charges: Vec<Charge>,
        submitted_on: NaiveDate,
    ) -> Result<DepositAccount> {
        let mut errors = config.validate();

        if term.is_term_deposit() && chart.is_none() && config.nominal_annual_rate.is_zero() {
            errors.push(ValidationError::new(
                "nominal_annual_rate",
                "a term deposit needs a rate chart or a non-zero nominal rate",
            ));
        }
        if let Some(t) = term.term() {
            if !t.deposit_amount.is_positive() {
                errors.push(ValidationError::new("deposit_amount", "must be positive"));
            }
            if t.deposit_amount.currency() != config.currency {
                errors.push(ValidationError::new(
                    "deposit_amount",
                    "currency differs from the account currency",
                ));
            }
            if t.deposit_period == 0 {
                errors.push(ValidationError::new("deposit_period", "must be at least 1"));
            }
        }
        if let Some(schedule) = term.schedule() {
            if !schedule.installment_amount.is_positive() {
                errors.push(ValidationError::new(
                    "installment_amount",
                    "must be positive",
                ));
            }
            if schedule.recurring_every == 0 {
                errors.push(ValidationError::new("recurring_every", "must be at least 1"));
            }
        }
        for charge in &charges {
            if charge.amount.is_negative() {
                errors.push(ValidationError::new("charge.amount", "must not be negative"));
            }
            if charge.amount.currency() != config.currency {
                errors.push(ValidationError::new(
                    "charge.amount",
                    "currency differs from the account currency",
                ));
            }
        }

        if !errors.is_empty() {
            return Err(EngineError::validation(errors));
        }

        let currency = config.currency;
        Ok(DepositAccount {
            id,
            office_id,
            holder,
            config,
            chart,
            term,
            charges,
            status: AccountStatus::SubmittedAndPendingApproval,
            sub_status: SubStatus::None,
            block: BlockState::None,
            submitted_on,
            approved_on: None,
            approved_by: None,
            activated_on: None,
            closed_on: None,
            ledger: TransactionLedger::new(currency),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn office_id(&self) -> u64 {
        self.office_id
    }

    pub fn holder(&self) -> AccountHolder {
        self.holder
    }

    pub fn config(&self) -> &AccountConfig {
        &self.config
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    pub fn sub_status(&self) -> SubStatus {
        self.sub_status
    }

    pub fn block_state(&self) -> BlockState {
        self.block
    }

    pub fn submitted_on(&self) -> NaiveDate {
        self.submitted_on
    }

    pub fn approved_on(&self) -> Option<NaiveDate> {
        self.approved_on
    }

    pub fn activated_on(&self) -> Option<NaiveDate> {
        self.activated_on
    }

    pub fn closed_on(&self) -> Option<NaiveDate> {
        self.closed_on
    }

    pub fn term(&self) -> &TermStrategy {
        &self.term
    }

    pub fn charges(&self) -> &[Charge] {
        &self.charges
    }

    pub fn ledger(&self) -> &TransactionLedger {
        &self.ledger
    }

    /// Current account balance.
    pub fn balance(&self) -> Money {
        self.ledger.balance()
    }

    /// Approves the application, recording who approved it.
    pub fn approve(&mut self, date: NaiveDate, approved_by: Option<String>) -> Result<()> {
        self.ensure_transition("approve", AccountStatus::Approved)?;
        self.status = AccountStatus::Approved;
        self.approved_on = Some(date);
        self.approved_by = approved_by;
        Ok(())
    }

    /// Undoes an approval, returning the account to the submitted state.
    /// The only backward lifecycle transition.
    pub fn undo_approval(&mut self) -> Result<()> {
        self.ensure_transition("undo approval", AccountStatus::SubmittedAndPendingApproval)?;
        self.status = AccountStatus::SubmittedAndPendingApproval;
        self.approved_on = None;
        self.approved_by = None;
        Ok(())
    }

    /// Rejects the application. Terminal.
    pub fn reject(&mut self, date: NaiveDate) -> Result<()> {
        self.ensure_transition("reject", AccountStatus::Rejected)?;
        self.status = AccountStatus::Rejected;
        self.closed_on = Some(date);
        Ok(())
    }

    /// Records the applicant withdrawing the application. Terminal.
    pub fn withdraw_application(&mut self, date: NaiveDate) -> Result<()> {
        self.ensure_transition("withdraw application", AccountStatus::WithdrawnByApplicant)?;
        self.status = AccountStatus::WithdrawnByApplicant;
        self.closed_on = Some(date);
        Ok(())
    }

    /// Activates the account.
    ///
    /// Sets the maturity date for term deposits, books the principal of a
    /// fixed deposit, generates the recurring schedule (deriving the total
    /// deposit amount from it), collects activation charges and projects the
    /// maturity amount.
    pub fn activate(&mut self, date: NaiveDate) -> Result<()> {
        self.ensure_transition("activate", AccountStatus::Active)?;
        if date < self.submitted_on {
            return Err(EngineError::validation(vec![ValidationError::new(
                "activated_on",
                format!("cannot precede submission date {}", self.submitted_on),
            )]));
        }

        match &mut self.term {
            TermStrategy::None => {}
            TermStrategy::Fixed(term) => {
                term.maturity_date = Some(term.derive_maturity_date(date));
            }
            TermStrategy::Recurring { term, schedule } => {
                term.maturity_date = Some(term.derive_maturity_date(date));
                schedule.generate_schedule(date, term.maturity_date);
                term.deposit_amount = schedule.total_expected();
            }
        }

        if let (Some(min), TermStrategy::Fixed(term)) =
            (self.config.min_required_opening_balance, &self.term)
        {
            if term.deposit_amount.amount() < min {
                return Err(EngineError::validation(vec![ValidationError::new(
                    "deposit_amount",
                    format!("below the minimum opening balance of {min}"),
                )]));
            }
        }

        self.status = AccountStatus::Active;
        self.activated_on = Some(date);

        // The principal of a fixed deposit is booked at activation; recurring
        // deposits receive their money installment by installment.
        if let TermStrategy::Fixed(term) = &self.term {
            let principal = term.deposit_amount;
            self.ledger.append(TransactionKind::Deposit, date, principal);
        }

        for charge in &mut self.charges {
            if charge.due == ChargeTime::Activation && !charge.paid && !charge.waived {
                self.ledger.append(TransactionKind::Charge, date, charge.amount);
                charge.paid = true;
            }
        }

        self.recalculate(date);
        if self.term.is_term_deposit() {
            self.update_maturity_details()?;
        }
        debug!("account {} activated on {date}", self.id);
        Ok(())
    }

    /// Records a deposit and returns the new transaction id.
    pub fn deposit(&mut self, date: NaiveDate, amount: Money, business_date: NaiveDate) -> Result<u64> {
        self.ensure_active("deposit")?;
        if !self.block.allows_credit() {
            return Err(if self.block == BlockState::Blocked {
                EngineError::AccountBlocked
            } else {
                EngineError::CreditsBlocked
            });
        }
        self.check_transaction_date(date, business_date)?;
        if !amount.is_positive() {
            return Err(EngineError::validation(vec![ValidationError::new(
                "amount",
                "must be positive",
            )]));
        }
        if let Some(min) = self.config.min_required_opening_balance {
            let is_first = !self
                .ledger
                .iter_active()
                .any(|tx| tx.kind == TransactionKind::Deposit);
            if is_first && amount.amount() < min {
                return Err(EngineError::validation(vec![ValidationError::new(
                    "amount",
                    format!("opening deposit is below the minimum of {min}"),
                )]));
            }
        }

        let id = self.ledger.append(TransactionKind::Deposit, date, amount);
        self.recalculate(business_date);
        self.reallocate_installments();
        Ok(id)
    }

    /// Records a withdrawal and returns the new transaction id.
    pub fn withdraw(
        &mut self,
        date: NaiveDate,
        amount: Money,
        business_date: NaiveDate,
    ) -> Result<u64> {
        self.ensure_active("withdraw")?;
        if !self.block.allows_debit() {
            return Err(if self.block == BlockState::Blocked {
                EngineError::AccountBlocked
            } else {
                EngineError::DebitsBlocked
            });
        }
        self.check_transaction_date(date, business_date)?;
        if !amount.is_positive() {
            return Err(EngineError::validation(vec![ValidationError::new(
                "amount",
                "must be positive",
            )]));
        }
        if let (Some(lock_in), Some(activated)) = (&self.config.lock_in, self.activated_on) {
            let until = lock_in.end_date(activated);
            if date < until {
                return Err(EngineError::LockInActive { until });
            }
        }

        let projected = self.ledger.balance() - amount;
        if projected.is_negative() {
            match &self.config.overdraft {
                Some(overdraft) if projected.abs().amount() <= overdraft.limit => {}
                Some(overdraft) => {
                    return Err(EngineError::OverdraftLimitExceeded {
                        limit: overdraft.limit.to_string(),
                    });
                }
                None => {
                    return Err(EngineError::InsufficientBalance {
                        balance: self.ledger.balance().to_string(),
                        requested: amount.to_string(),
                    });
                }
            }
        }

        let id = self.ledger.append(TransactionKind::Withdrawal, date, amount);
        self.recalculate(business_date);
        Ok(id)
    }

    /// Collects a charge due on demand.
    pub fn pay_charge(&mut self, charge_id: u64, date: NaiveDate, business_date: NaiveDate) -> Result<u64> {
        self.ensure_active("pay charge")?;
        self.check_transaction_date(date, business_date)?;
        let charge = match self
            .charges
            .iter_mut()
            .find(|c| c.id == charge_id && !c.paid && !c.waived)
        {
            Some(charge) => charge,
            None => {
                return Err(EngineError::validation(vec![ValidationError::new(
                    "charge_id",
                    "no unpaid, unwaived charge with this id",
                )]));
            }
        };
        let amount = charge.amount;
        charge.paid = true;
        let id = self.ledger.append(TransactionKind::Charge, date, amount);
        self.recalculate(business_date);
        Ok(id)
    }

    /// Waives a charge. An already collected charge is credited back.
    pub fn waive_charge(&mut self, charge_id: u64, date: NaiveDate) -> Result<()> {
        let charge = match self.charges.iter_mut().find(|c| c.id == charge_id && !c.waived) {
            Some(charge) => charge,
            None => {
                return Err(EngineError::validation(vec![ValidationError::new(
                    "charge_id",
                    "no unwaived charge with this id",
                )]));
            }
        };
        charge.waived = true;
        if charge.paid {
            let amount = charge.amount;
            self.ledger.append(TransactionKind::ChargeWaiver, date, amount);
            self.recalculate(date);
        }
        Ok(())
    }

    /// Blocks all transactions.
    pub fn block(&mut self) -> Result<()> {
        self.ensure_active("block")?;
        self.block = BlockState::Blocked;
        Ok(())
    }

    /// Blocks deposits only.
    pub fn block_credits(&mut self) -> Result<()> {
        self.ensure_active("block credits")?;
        self.block = BlockState::BlockedCredit;
        Ok(())
    }

    /// Blocks withdrawals only.
    pub fn block_debits(&mut self) -> Result<()> {
        self.ensure_active("block debits")?;
        self.block = BlockState::BlockedDebit;
        Ok(())
    }

    /// Lifts any block.
    pub fn unblock(&mut self) -> Result<()> {
        self.ensure_active("unblock")?;
        self.block = BlockState::None;
        Ok(())
    }

    /// Marks the account inactive (no recent customer-initiated activity).
    pub fn mark_inactive(&mut self) -> Result<()> {
        self.ensure_active("mark inactive")?;
        self.sub_status = SubStatus::Inactive;
        Ok(())
    }

    /// Marks the account dormant.
    pub fn mark_dormant(&mut self) -> Result<()> {
        self.ensure_active("mark dormant")?;
        self.sub_status = SubStatus::Dormant;
        Ok(())
    }

    /// Clears the inactive/dormant sub-status.
    pub fn reactivate(&mut self) -> Result<()> {
        self.ensure_active("reactivate")?;
        self.sub_status = SubStatus::None;
        Ok(())
    }

    /// Overdue installment count and total for a recurring deposit, as of
    /// `reference`. `None` for other account types.
    pub fn overdue_installments(&self, reference: NaiveDate) -> Option<(u32, Money)> {
        self.term.schedule().map(|s| s.overdue_as_of(reference))
    }

    /// The effective annual rate as a fraction, resolved against the rate
    /// chart (term deposits) or the nominal rate.
    pub fn effective_rate(&self) -> Result<Decimal> {
        self.effective_rate_fraction(None)
    }

    /// Computes posting periods up to `as_of` without touching the ledger.
    ///
    /// Purely diagnostic: openings are chained period to period through the
    /// closing balance with interest, exactly as posting would do it.
    pub fn calculate_interest(
        &self,
        as_of: NaiveDate,
        manual_posting_dates: &BTreeSet<NaiveDate>,
    ) -> Result<Vec<PostingPeriod>> {
        let start = self.require_activation("calculate interest")?;
        let rate = self.effective_rate_fraction(None)?;
        let params = self.interest_params(rate);
        Ok(compute_periods(
            &self.ledger,
            start,
            as_of,
            self.config.posting_frequency,
            manual_posting_dates,
            &params,
        ))
    }

    /// Posts interest (and withholding tax) up to `as_of`, reconciling the
    /// ledger against the computed periods until it is stable.
    ///
    /// Idempotent: a second call with the same arguments changes nothing and
    /// returns `false`.
    pub fn post_interest(
        &mut self,
        as_of: NaiveDate,
        manual_posting_dates: &BTreeSet<NaiveDate>,
    ) -> Result<bool> {
        let start = self.require_activation("post interest")?;
        if !self.status.is_transactional() {
            return Err(EngineError::InvalidAccountState {
                operation: "post interest",
                status: self.status,
            });
        }
        let rate = self.effective_rate_fraction(None)?;
        let params = self.interest_params(rate);
        Ok(self.reconcile_postings(start, as_of, &params, manual_posting_dates))
    }

    /// Recomputes the maturity date and projected maturity amount of a term
    /// deposit: the deposit amount plus interest over all posting periods up
    /// to the day before maturity.
    pub fn update_maturity_details(&mut self) -> Result<()> {
        let start = self.require_activation("update maturity details")?;
        let (maturity, deposit_amount) = match self.term.term() {
            Some(term) => (
                term.maturity_date
                    .unwrap_or_else(|| term.derive_maturity_date(start)),
                term.deposit_amount,
            ),
            None => return Ok(()),
        };
        let rate = self.effective_rate_fraction(None)?;
        let params = self.interest_params(rate);
        let horizon = maturity - Days::new(1);
        let periods = compute_periods(
            &self.ledger,
            start,
            horizon,
            self.config.posting_frequency,
            &BTreeSet::new(),
            &params,
        );
        let interest = periods
            .iter()
            .fold(Money::zero(self.config.currency), |acc, p| {
                acc + p.interest_to_post()
            });
        if let Some(term) = self.term.term_mut() {
            term.maturity_date = Some(maturity);
            term.maturity_amount = Some(deposit_amount + interest);
        }
        Ok(())
    }

    /// Matures a term deposit: posts interest up to the day before maturity
    /// and moves the account to the matured state.
    pub fn mature(&mut self, business_date: NaiveDate) -> Result<()> {
        self.ensure_transition("mature", AccountStatus::Matured)?;
        let maturity = match self.term.term().and_then(|t| t.maturity_date) {
            Some(maturity) => maturity,
            None => {
                return Err(EngineError::InvalidAccountState {
                    operation: "mature",
                    status: self.status,
                });
            }
        };
        if business_date < maturity {
            return Err(EngineError::FutureTransactionDate {
                date: maturity,
                business_date,
            });
        }
        self.post_interest(maturity - Days::new(1), &BTreeSet::new())?;
        self.update_maturity_details()?;
        self.status = AccountStatus::Matured;
        debug!("account {} matured on {maturity}", self.id);
        Ok(())
    }

    /// Closes the account, paying the balance out according to the closure
    /// action: withdrawal, transfer to savings, or earmarking for
    /// reinvestment.
    ///
    /// Savings accounts get a final interest posting up to the closure date.
    /// A term deposit must have matured (an active one past its maturity
    /// date is matured on the fly); before maturity use
    /// [`DepositAccount::premature_close`].
    pub fn close(&mut self, closure_date: NaiveDate, business_date: NaiveDate) -> Result<ClosureOutcome> {
        if closure_date > business_date {
            return Err(EngineError::FutureTransactionDate {
                date: closure_date,
                business_date,
            });
        }
        if let Some(last) = self.ledger.last_transaction_date() {
            if closure_date < last {
                return Err(EngineError::ClosureBeforeLastTransaction {
                    date: closure_date,
                    last_transaction_date: last,
                });
            }
        }

        if self.term.is_term_deposit() {
            let maturity = self.term.term().and_then(|t| t.maturity_date);
            match maturity {
                Some(maturity) if closure_date >= maturity => {
                    if self.status == AccountStatus::Active {
                        self.mature(business_date)?;
                    }
                }
                _ => {
                    return Err(EngineError::validation(vec![ValidationError::new(
                        "closure_date",
                        "before maturity; a term deposit needs a premature closure",
                    )]));
                }
            }
        } else {
            self.ensure_transition("close", AccountStatus::Closed)?;
            self.post_interest(closure_date, &BTreeSet::new())?;
        }
        self.ensure_transition("close", AccountStatus::Closed)?;

        self.settle(closure_date)
    }

    /// The amount a premature closure on `closure_date` would pay out,
    /// before any withholding-tax adjustment: the balance with posted
    /// interest backed out and replaced by interest recomputed at the
    /// penalized rate.
    pub fn premature_closure_amount(&self, closure_date: NaiveDate) -> Result<Money> {
        let start = self.require_activation("premature closure amount")?;
        let rate = self.effective_rate_fraction(Some(closure_date))?;
        let params = self.interest_params(rate);
        let periods = compute_periods(
            &self.ledger,
            start,
            closure_date,
            self.config.posting_frequency,
            &BTreeSet::new(),
            &params,
        );
        let recomputed = periods
            .iter()
            .fold(Money::zero(self.config.currency), |acc, p| {
                acc + p.interest_to_post()
            });
        Ok(self.ledger.balance() - self.ledger.total_interest_posted() + recomputed)
    }

    /// Closes a term deposit before maturity.
    ///
    /// Interest already posted is reconciled down to the penalized effective
    /// rate (reverse and recreate, never edited), then the balance is paid
    /// out per the closure action.
    pub fn premature_close(
        &mut self,
        closure_date: NaiveDate,
        business_date: NaiveDate,
    ) -> Result<ClosureOutcome> {
        let start = self.require_activation("premature close")?;
        if self.status != AccountStatus::Active {
            return Err(EngineError::InvalidAccountState {
                operation: "premature close",
                status: self.status,
            });
        }
        let maturity = match self.term.term().and_then(|t| t.maturity_date) {
            Some(maturity) => maturity,
            None => {
                return Err(EngineError::InvalidAccountState {
                    operation: "premature close",
                    status: self.status,
                });
            }
        };
        if closure_date >= maturity {
            return Err(EngineError::validation(vec![ValidationError::new(
                "closure_date",
                format!("on or after maturity date {maturity}; use a regular closure"),
            )]));
        }
        if closure_date > business_date {
            return Err(EngineError::FutureTransactionDate {
                date: closure_date,
                business_date,
            });
        }
        if let Some(last) = self.ledger.last_transaction_date() {
            if closure_date < last {
                return Err(EngineError::ClosureBeforeLastTransaction {
                    date: closure_date,
                    last_transaction_date: last,
                });
            }
        }

        let rate = self.effective_rate_fraction(Some(closure_date))?;
        let params = self.interest_params(rate);
        self.reconcile_postings(start, closure_date, &params, &BTreeSet::new());

        self.settle(closure_date)
    }

    /// Opens the follow-up account for a [`ClosureOutcome::Reinvest`]: same
    /// configuration, chart and term, with the realized balance as the new
    /// deposit amount, approved and activated on the closure date.
    pub fn reinvestment(
        &self,
        new_id: u64,
        closure_date: NaiveDate,
        amount: Money,
    ) -> Result<DepositAccount> {
        let strategy = match &self.term {
            TermStrategy::None => {
                return Err(EngineError::InvalidAccountState {
                    operation: "reinvest",
                    status: self.status,
                });
            }
            TermStrategy::Fixed(term) => {
                let mut term = term.clone();
                term.deposit_amount = amount;
                term.maturity_date = None;
                term.maturity_amount = None;
                TermStrategy::Fixed(term)
            }
            TermStrategy::Recurring { term, schedule } => {
                let mut term = term.clone();
                term.deposit_amount = amount;
                term.maturity_date = None;
                term.maturity_amount = None;
                let mut schedule = schedule.clone();
                schedule.installments.clear();
                TermStrategy::Recurring { term, schedule }
            }
        };

        let mut account = DepositAccount::submit(
            new_id,
            self.office_id,
            self.holder,
            self.config.clone(),
            strategy,
            self.chart.clone(),
            Vec::new(),
            closure_date,
        )?;
        account.approve(closure_date, self.approved_by.clone())?;
        account.activate(closure_date)?;
        // The realized balance carries into a recurring follow-up as an
        // ordinary deposit; a fixed follow-up booked it at activation.
        if matches!(account.term, TermStrategy::Recurring { .. }) {
            account.deposit(closure_date, amount, closure_date)?;
        }
        Ok(account)
    }

    /// Force-closes the account under escheat rules: the full balance is
    /// debited to the escheat transaction and the account is closed with the
    /// escheat sub-status.
    pub fn escheat(&mut self, date: NaiveDate) -> Result<()> {
        self.ensure_transition("escheat", AccountStatus::Closed)?;
        let balance = self.ledger.balance();
        if balance.is_positive() {
            self.ledger.append(TransactionKind::Escheat, date, balance);
        }
        self.status = AccountStatus::Closed;
        self.sub_status = SubStatus::Escheat;
        self.closed_on = Some(date);
        self.recalculate(date);
        debug!("account {} escheated on {date}", self.id);
        Ok(())
    }

    /// Pays the balance out and moves the account to closed. Shared tail of
    /// regular and premature closure.
    fn settle(&mut self, closure_date: NaiveDate) -> Result<ClosureOutcome> {
        let payout = self.ledger.balance();
        if payout.is_negative() {
            return Err(EngineError::InsufficientBalance {
                balance: payout.to_string(),
                requested: payout.abs().to_string(),
            });
        }
        let action = self
            .term
            .term()
            .map(|t| t.on_closure)
            .unwrap_or(OnClosureAction::Withdraw);

        if payout.is_positive() {
            if action == OnClosureAction::TransferToSavings {
                // Marker recording the hand-off; the withdrawal moves the money.
                self.ledger
                    .append(TransactionKind::Transfer, closure_date, payout);
            }
            self.ledger
                .append(TransactionKind::Withdrawal, closure_date, payout);
        }

        self.status = AccountStatus::Closed;
        self.closed_on = Some(closure_date);
        self.recalculate(closure_date);
        debug!("account {} closed on {closure_date}, payout {payout}", self.id);

        Ok(match action {
            OnClosureAction::Withdraw => ClosureOutcome::Withdrawn(payout),
            OnClosureAction::TransferToSavings => ClosureOutcome::TransferredToSavings(payout),
            OnClosureAction::Reinvest => ClosureOutcome::Reinvest(payout),
        })
    }

    /// Runs posting and withholding against recomputed periods until the
    /// ledger stops changing. Converges because period computation ignores
    /// interest and withholding transactions.
    fn reconcile_postings(
        &mut self,
        start: NaiveDate,
        as_of: NaiveDate,
        params: &InterestParams,
        manual_posting_dates: &BTreeSet<NaiveDate>,
    ) -> bool {
        if as_of < start {
            return false;
        }
        let mut any_change = false;
        loop {
            let periods = compute_periods(
                &self.ledger,
                start,
                as_of,
                self.config.posting_frequency,
                manual_posting_dates,
                params,
            );
            let mut changed = apply_interest_postings(&mut self.ledger, &periods);
            if let Some(tax) = &self.config.withhold_tax {
                if let Some(last) = periods.last() {
                    changed |= apply_tax_withholding(&mut self.ledger, tax, last.posting_date);
                }
            }
            self.recalculate(as_of);
            if !changed {
                return any_change;
            }
            any_change = true;
        }
    }

    fn effective_rate_fraction(&self, premature_withdrawal: Option<NaiveDate>) -> Result<Decimal> {
        let term = match self.term.term() {
            None => return Ok(self.config.nominal_annual_rate / Decimal::ONE_HUNDRED),
            Some(term) => term,
        };
        let start = self.activated_on.unwrap_or(self.submitted_on);
        let maturity = term
            .maturity_date
            .unwrap_or_else(|| term.derive_maturity_date(start));
        let window = match premature_withdrawal {
            Some(withdrawal_date) => ClosureWindow::Premature { withdrawal_date },
            None => ClosureWindow::AtMaturity,
        };
        let chart = self.chart.as_ref().filter(|c| c.applies_on(start));
        resolve_effective_rate(
            chart,
            self.config.nominal_annual_rate,
            term.deposit_amount.amount(),
            start,
            maturity,
            window,
            term.penalty.as_ref(),
        )
    }

    fn interest_params(&self, rate_fraction: Decimal) -> InterestParams {
        let overdraft_rate_fraction = self
            .config
            .overdraft
            .as_ref()
            .map(|od| od.annual_rate / Decimal::ONE_HUNDRED)
            .unwrap_or(Decimal::ZERO);
        InterestParams {
            rate_fraction,
            overdraft_rate_fraction,
            days_in_year: self.config.days_in_year,
            compounding: self.config.compounding,
            method: self.config.calculation_method,
            min_balance_for_interest: self.config.min_balance_for_interest,
            financial_year_start_month: self.config.financial_year_start_month,
        }
    }

    fn recalculate(&mut self, as_of: NaiveDate) {
        let opening = Money::zero(self.config.currency);
        self.ledger.recalculate_balances(opening, as_of);
    }

    fn reallocate_installments(&mut self) {
        let deposits: Vec<(NaiveDate, Money)> = self
            .ledger
            .iter_active()
            .filter(|tx| tx.kind == TransactionKind::Deposit)
            .map(|tx| (tx.date, tx.amount))
            .collect();
        if let TermStrategy::Recurring { schedule, .. } = &mut self.term {
            schedule.allocate_deposits(&deposits);
        }
    }

    fn ensure_transition(&self, operation: &'static str, next: AccountStatus) -> Result<()> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(EngineError::InvalidAccountState {
                operation,
                status: self.status,
            })
        }
    }

    fn ensure_active(&self, operation: &'static str) -> Result<()> {
        if self.status == AccountStatus::Active {
            Ok(())
        } else {
            Err(EngineError::InvalidAccountState {
                operation,
                status: self.status,
            })
        }
    }

    fn require_activation(&self, operation: &'static str) -> Result<NaiveDate> {
        self.activated_on.ok_or(EngineError::InvalidAccountState {
            operation,
            status: self.status,
        })
    }

    fn check_transaction_date(&self, date: NaiveDate, business_date: NaiveDate) -> Result<()> {
        if let Some(activated) = self.activated_on {
            if date < activated {
                return Err(EngineError::TransactionBeforeActivation {
                    date,
                    activated_on: activated,
                });
            }
        }
        if date > business_date {
            return Err(EngineError::FutureTransactionDate {
                date,
                business_date,
            });
        }
        if let Some(maturity) = self.term.term().and_then(|t| t.maturity_date) {
            if date > maturity {
                return Err(EngineError::TransactionAfterMaturity {
                    date,
                    maturity_date: maturity,
                });
            }
        }
        Ok(())
    }
}

/// Splits `[start, as_of]` into posting periods and computes interest for
/// each, chaining the opening balance through the closing balance with
/// interest of the previous period.
fn compute_periods(
    ledger: &TransactionLedger,
    start: NaiveDate,
    as_of: NaiveDate,
    frequency: PostingFrequency,
    manual_posting_dates: &BTreeSet<NaiveDate>,
    params: &InterestParams,
) -> Vec<PostingPeriod> {
    let slices = split_posting_periods(
        start,
        as_of,
        frequency,
        params.financial_year_start_month,
        manual_posting_dates,
    );
    let mut periods = Vec::with_capacity(slices.len());
    let mut opening = Money::zero(ledger.currency());
    for slice in slices {
        let period = PostingPeriod::create_from(
            slice.interval,
            slice.user_requested,
            opening,
            ledger.transactions(),
            params,
            as_of,
        );
        opening = period.closing_balance_with_interest();
        periods.push(period);
    }
    periods
}
