//! Deposit terms: fixed maturity, premature closure, recurring schedules.
//!
//! Term handling is a strategy attached to the account aggregate: ordinary
//! savings carry no term, fixed deposits carry a term and pre-closure
//! settings, recurring deposits additionally carry an installment schedule.

use crate::money::Money;
use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Number of installments generated ahead for open-ended recurring deposits.
pub const RECURRING_LOOKAHEAD_INSTALLMENTS: usize = 12;

/// Calendar unit used for deposit periods and installment frequencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodFrequencyUnit {
    Days,
    Weeks,
    Months,
    Years,
}

impl PeriodFrequencyUnit {
    /// Advances a date by `n` of this unit using calendar arithmetic.
    ///
    /// Month and year steps use calendar rollover: the day of month is
    /// clamped to the target month's length (Jan 31 + 1 month = Feb 29 in a
    /// leap year), not a fixed day count.
    pub fn advance(&self, date: NaiveDate, n: u32) -> NaiveDate {
        match self {
            PeriodFrequencyUnit::Days => date + Days::new(u64::from(n)),
            PeriodFrequencyUnit::Weeks => date + Days::new(u64::from(n) * 7),
            PeriodFrequencyUnit::Months => date + Months::new(n),
            PeriodFrequencyUnit::Years => date + Months::new(n * 12),
        }
    }

    /// Number of whole units elapsed between two dates.
    pub fn periods_between(&self, start: NaiveDate, end: NaiveDate) -> i64 {
        if end < start {
            return 0;
        }
        match self {
            PeriodFrequencyUnit::Days => (end - start).num_days(),
            PeriodFrequencyUnit::Weeks => (end - start).num_days() / 7,
            PeriodFrequencyUnit::Months => {
                let mut months = i64::from(end.year() - start.year()) * 12
                    + i64::from(end.month()) - i64::from(start.month());
                if end.day() < start.day() {
                    months -= 1;
                }
                months.max(0)
            }
            PeriodFrequencyUnit::Years => {
                PeriodFrequencyUnit::Months.periods_between(start, end) / 12
            }
        }
    }
}

/// Which window the penalized rate applies over when a term deposit is
/// closed before maturity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreClosureInterestBasis {
    /// Rate the deposit as if held for the whole term.
    WholeTerm,

    /// Rate the deposit only up to the actual withdrawal date.
    TillPrematureWithdrawal,
}

/// Premature-closure penalty settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreClosurePenalty {
    /// Flat rate reduction in percentage points.
    pub penalty_rate: rust_decimal::Decimal,

    /// Window the (penalized) rate is resolved over.
    pub interest_basis: PreClosureInterestBasis,
}

impl PreClosurePenalty {
    /// The close date used for rate-slab selection under this policy.
    pub fn rated_close_date(&self, maturity_date: NaiveDate, withdrawal_date: NaiveDate) -> NaiveDate {
        match self.interest_basis {
            PreClosureInterestBasis::WholeTerm => maturity_date - Days::new(1),
            PreClosureInterestBasis::TillPrematureWithdrawal => withdrawal_date,
        }
    }
}

/// Terminal action when a term deposit closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnClosureAction {
    /// Pay the realized balance out.
    Withdraw,

    /// Hand the realized balance to the external funds-transfer collaborator.
    TransferToSavings,

    /// Open a new deposit account with the realized balance as its opening
    /// deposit, carrying the product configuration forward.
    Reinvest,
}

/// Term settings of a fixed or recurring deposit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermAndPreClosure {
    /// Principal deposit amount.
    pub deposit_amount: Money,

    /// Length of the deposit period, in `period_unit`s.
    pub deposit_period: u32,

    /// Unit of the deposit period.
    pub period_unit: PeriodFrequencyUnit,

    /// Computed maturity date; set on activation and on each recompute.
    pub maturity_date: Option<NaiveDate>,

    /// Computed maturity amount; set on each maturity recompute.
    pub maturity_amount: Option<Money>,

    /// Premature-closure penalty, if configured.
    pub penalty: Option<PreClosurePenalty>,

    /// What happens to the balance on closure.
    pub on_closure: OnClosureAction,
}

impl TermAndPreClosure {
    /// Creates a term with no computed maturity yet.
    pub fn new(
        deposit_amount: Money,
        deposit_period: u32,
        period_unit: PeriodFrequencyUnit,
        penalty: Option<PreClosurePenalty>,
        on_closure: OnClosureAction,
    ) -> Self {
        TermAndPreClosure {
            deposit_amount,
            deposit_period,
            period_unit,
            maturity_date: None,
            maturity_amount: None,
            penalty,
            on_closure,
        }
    }

    /// Maturity date: activation date advanced by the deposit period.
    pub fn derive_maturity_date(&self, activated_on: NaiveDate) -> NaiveDate {
        self.period_unit.advance(activated_on, self.deposit_period)
    }
}

/// One expected installment of a recurring deposit schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringInstallment {
    /// 1-based installment number.
    pub number: u32,

    /// Date the installment falls due.
    pub due_date: NaiveDate,

    /// Expected deposit amount.
    pub amount_due: Money,

    /// Amount allocated to this installment so far.
    pub amount_paid: Money,
}

impl RecurringInstallment {
    /// Amount still outstanding on this installment.
    pub fn outstanding(&self) -> Money {
        self.amount_due - self.amount_paid
    }

    /// Returns `true` once the full expected amount has been allocated.
    pub fn is_fully_paid(&self) -> bool {
        !self.outstanding().is_positive()
    }
}

/// Recurring-deposit schedule state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringDetail {
    /// Expected amount of each installment.
    pub installment_amount: Money,

    /// An installment falls due every `recurring_every` `frequency_unit`s.
    pub recurring_every: u32,

    /// Unit of the installment frequency.
    pub frequency_unit: PeriodFrequencyUnit,

    /// Whether deposits made ahead of an installment's due date may be
    /// credited toward it.
    pub allow_advance_payments: bool,

    /// The generated schedule, ordered by due date.
    pub installments: Vec<RecurringInstallment>,
}

impl RecurringDetail {
    /// Creates an empty schedule definition.
    pub fn new(
        installment_amount: Money,
        recurring_every: u32,
        frequency_unit: PeriodFrequencyUnit,
        allow_advance_payments: bool,
    ) -> Self {
        RecurringDetail {
            installment_amount,
            recurring_every,
            frequency_unit,
            allow_advance_payments,
            installments: Vec::new(),
        }
    }

    /// Regenerates the installment schedule from scratch.
    ///
    /// Installments fall due starting at `start` and every
    /// `recurring_every` units thereafter, up to (not including) the
    /// maturity date. With no maturity date the schedule extends a
    /// [`RECURRING_LOOKAHEAD_INSTALLMENTS`]-installment look-ahead window.
    /// Any previous schedule and its paid amounts are discarded; callers
    /// re-allocate deposits afterwards.
    pub fn generate_schedule(&mut self, start: NaiveDate, maturity_date: Option<NaiveDate>) {
        self.installments.clear();
        let mut due = start;
        let mut number = 1u32;
        loop {
            match maturity_date {
                Some(maturity) => {
                    if due >= maturity {
                        break;
                    }
                }
                None => {
                    if self.installments.len() >= RECURRING_LOOKAHEAD_INSTALLMENTS {
                        break;
                    }
                }
            }
            self.installments.push(RecurringInstallment {
                number,
                due_date: due,
                amount_due: self.installment_amount,
                amount_paid: Money::zero(self.installment_amount.currency()),
            });
            number += 1;
            due = self.frequency_unit.advance(due, self.recurring_every);
        }
    }

    /// Re-allocates deposits against the schedule in transaction order.
    ///
    /// Each deposit is applied to the earliest not-fully-paid installment.
    /// When advance payments are not allowed and the deposit predates that
    /// installment's due date, the allocation for it is forced to zero and
    /// the remainder stays unallocated.
    pub fn allocate_deposits(&mut self, deposits: &[(NaiveDate, Money)]) {
        let zero = Money::zero(self.installment_amount.currency());
        for installment in &mut self.installments {
            installment.amount_paid = zero;
        }

        for &(date, amount) in deposits {
            let mut remaining = amount;
            for installment in &mut self.installments {
                if !remaining.is_positive() {
                    break;
                }
                if installment.is_fully_paid() {
                    continue;
                }
                if !self.allow_advance_payments && date < installment.due_date {
                    break;
                }
                let allocated = remaining.min(installment.outstanding());
                installment.amount_paid += allocated;
                remaining -= allocated;
            }
        }
    }

    /// Count and total amount of installments overdue as of `reference`.
    ///
    /// An installment is overdue once its due date has passed (strictly
    /// before the reference date) without being fully paid.
    pub fn overdue_as_of(&self, reference: NaiveDate) -> (u32, Money) {
        let mut count = 0u32;
        let mut total = Money::zero(self.installment_amount.currency());
        for installment in &self.installments {
            if installment.due_date < reference && !installment.is_fully_paid() {
                count += 1;
                total += installment.outstanding();
            }
        }
        (count, total)
    }

    /// Total expected deposit over the whole schedule.
    pub fn total_expected(&self) -> Money {
        self.installments
            .iter()
            .fold(Money::zero(self.installment_amount.currency()), |acc, i| {
                acc + i.amount_due
            })
    }
}

/// Term behavior attached to an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TermStrategy {
    /// Ordinary savings: no term, no maturity.
    None,

    /// Fixed-term deposit.
    Fixed(TermAndPreClosure),

    /// Recurring deposit: a term plus an installment schedule.
    Recurring {
        term: TermAndPreClosure,
        schedule: RecurringDetail,
    },
}

impl TermStrategy {
    /// The term settings, if this is a term deposit.
    pub fn term(&self) -> Option<&TermAndPreClosure> {
        match self {
            TermStrategy::None => None,
            TermStrategy::Fixed(term) => Some(term),
            TermStrategy::Recurring { term, .. } => Some(term),
        }
    }

    /// Mutable access to the term settings.
    pub fn term_mut(&mut self) -> Option<&mut TermAndPreClosure> {
        match self {
            TermStrategy::None => None,
            TermStrategy::Fixed(term) => Some(term),
            TermStrategy::Recurring { term, .. } => Some(term),
        }
    }

    /// The recurring schedule, if this is a recurring deposit.
    pub fn schedule(&self) -> Option<&RecurringDetail> {
        match self {
            TermStrategy::Recurring { schedule, .. } => Some(schedule),
            _ => None,
        }
    }

    /// Returns `true` for fixed and recurring deposits.
    pub fn is_term_deposit(&self) -> bool {
        !matches!(self, TermStrategy::None)
    }
}
