//! Account lifecycle states and transition rules.
//!
//! Status transitions are monotonic except for the explicit undo family;
//! the sub-status and block state are orthogonal to the main status. Side
//! effects of each transition live on the account aggregate; this module
//! only answers whether a transition is allowed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Main lifecycle status of a deposit account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    /// Application submitted, awaiting approval.
    SubmittedAndPendingApproval,

    /// Approved but not yet activated.
    Approved,

    /// Live account accepting transactions.
    Active,

    /// Term deposit that has reached its maturity date.
    Matured,

    /// Closed; terminal.
    Closed,

    /// Application rejected; terminal.
    Rejected,

    /// Application withdrawn by the applicant; terminal.
    WithdrawnByApplicant,
}

impl AccountStatus {
    /// Returns `true` if the given transition is allowed.
    ///
    /// The only non-monotonic transition is the undo of an approval,
    /// `Approved -> SubmittedAndPendingApproval`.
    pub fn can_transition_to(&self, next: AccountStatus) -> bool {
        use AccountStatus::*;
        matches!(
            (self, next),
            (SubmittedAndPendingApproval, Approved)
                | (SubmittedAndPendingApproval, Rejected)
                | (SubmittedAndPendingApproval, WithdrawnByApplicant)
                | (Approved, Active)
                | (Approved, SubmittedAndPendingApproval)
                | (Active, Matured)
                | (Active, Closed)
                | (Matured, Closed)
        )
    }

    /// Returns `true` while the account accepts monetary transactions.
    pub fn is_transactional(&self) -> bool {
        matches!(self, AccountStatus::Active | AccountStatus::Matured)
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccountStatus::SubmittedAndPendingApproval => "submitted and pending approval",
            AccountStatus::Approved => "approved",
            AccountStatus::Active => "active",
            AccountStatus::Matured => "matured",
            AccountStatus::Closed => "closed",
            AccountStatus::Rejected => "rejected",
            AccountStatus::WithdrawnByApplicant => "withdrawn by applicant",
        };
        f.write_str(name)
    }
}

/// Orthogonal sub-state of an active account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubStatus {
    None,
    Inactive,
    Dormant,
    Escheat,
}

/// Whether deposits and/or withdrawals are currently blocked.
///
/// Toggling a block never changes the main status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockState {
    /// No restriction.
    None,

    /// Both credits and debits blocked.
    Blocked,

    /// Deposits blocked, withdrawals allowed.
    BlockedCredit,

    /// Withdrawals blocked, deposits allowed.
    BlockedDebit,
}

impl BlockState {
    /// Returns `true` if credit (deposit) operations are permitted.
    pub fn allows_credit(&self) -> bool {
        matches!(self, BlockState::None | BlockState::BlockedDebit)
    }

    /// Returns `true` if debit (withdrawal) operations are permitted.
    pub fn allows_debit(&self) -> bool {
        matches!(self, BlockState::None | BlockState::BlockedCredit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AccountStatus::*;

    #[test]
    fn test_forward_transitions() {
        assert!(SubmittedAndPendingApproval.can_transition_to(Approved));
        assert!(SubmittedAndPendingApproval.can_transition_to(Rejected));
        assert!(SubmittedAndPendingApproval.can_transition_to(WithdrawnByApplicant));
        assert!(Approved.can_transition_to(Active));
        assert!(Active.can_transition_to(Matured));
        assert!(Active.can_transition_to(Closed));
        assert!(Matured.can_transition_to(Closed));
    }

    #[test]
    fn test_undo_approval_is_the_only_backward_transition() {
        assert!(Approved.can_transition_to(SubmittedAndPendingApproval));
        assert!(!Active.can_transition_to(Approved));
        assert!(!Closed.can_transition_to(Active));
        assert!(!Rejected.can_transition_to(SubmittedAndPendingApproval));
    }

    #[test]
    fn test_terminal_states_allow_nothing() {
        for terminal in [Closed, Rejected, WithdrawnByApplicant] {
            for next in [
                SubmittedAndPendingApproval,
                Approved,
                Active,
                Matured,
                Closed,
                Rejected,
                WithdrawnByApplicant,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_block_state_permissions() {
        assert!(BlockState::None.allows_credit());
        assert!(BlockState::None.allows_debit());
        assert!(!BlockState::Blocked.allows_credit());
        assert!(!BlockState::Blocked.allows_debit());
        assert!(BlockState::BlockedCredit.allows_debit());
        assert!(!BlockState::BlockedCredit.allows_credit());
        assert!(BlockState::BlockedDebit.allows_credit());
        assert!(!BlockState::BlockedDebit.allows_debit());
    }
}
