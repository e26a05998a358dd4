//! The module contains the errors the engine can throw.
//!
//! Validation errors ([`InvalidSplitParams`], [`InvalidSettlement`], ...) are
//! always returned before any balance is touched. Persistence errors
//! ([`PersistenceFailure`], [`Database`]) are propagated after the ledger has
//! undone every delta it already wrote. [`LedgerInconsistency`] signals a
//! broken internal invariant and is never corrected silently.
//!
//!  [`InvalidSplitParams`]: EngineError::InvalidSplitParams
//!  [`InvalidSettlement`]: EngineError::InvalidSettlement
//!  [`PersistenceFailure`]: EngineError::PersistenceFailure
//!  [`Database`]: EngineError::Database
//!  [`LedgerInconsistency`]: EngineError::LedgerInconsistency
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid split parameters: {0}")]
    InvalidSplitParams(String),
    #[error("Invalid settlement: {0}")]
    InvalidSettlement(String),
    #[error("Invalid expense: {0}")]
    InvalidExpense(String),
    #[error("Invalid name: {0}")]
    InvalidName(String),
    #[error("Group not found: {0}")]
    GroupNotFound(String),
    #[error("Member not found: {0}")]
    MemberNotFound(String),
    #[error("Expense not found: {0}")]
    ExpenseNotFound(String),
    #[error("Expense conflict: {0}")]
    ExpenseConflict(String),
    #[error("Non-zero balance on removal: {0}")]
    NonZeroBalanceOnRemoval(String),
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Ledger inconsistency: {0}")]
    LedgerInconsistency(String),
}

impl EngineError {
    /// Returns `true` when retrying the same operation may succeed.
    ///
    /// Storage hiccups and optimistic-concurrency conflicts are retryable;
    /// validation errors are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PersistenceFailure(_) | Self::Database(_) | Self::ExpenseConflict(_)
        )
    }

    /// Message safe to show to an end user.
    ///
    /// Storage and ledger internals are collapsed into a generic retry
    /// message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::PersistenceFailure(_) | Self::Database(_) | Self::LedgerInconsistency(_) => {
                "Something went wrong while saving. Please try again.".to_string()
            }
            Self::ExpenseConflict(_) => {
                "This expense was changed by someone else. Reload and try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidSplitParams(a), Self::InvalidSplitParams(b)) => a == b,
            (Self::InvalidSettlement(a), Self::InvalidSettlement(b)) => a == b,
            (Self::InvalidExpense(a), Self::InvalidExpense(b)) => a == b,
            (Self::InvalidName(a), Self::InvalidName(b)) => a == b,
            (Self::GroupNotFound(a), Self::GroupNotFound(b)) => a == b,
            (Self::MemberNotFound(a), Self::MemberNotFound(b)) => a == b,
            (Self::ExpenseNotFound(a), Self::ExpenseNotFound(b)) => a == b,
            (Self::ExpenseConflict(a), Self::ExpenseConflict(b)) => a == b,
            (Self::NonZeroBalanceOnRemoval(a), Self::NonZeroBalanceOnRemoval(b)) => a == b,
            (Self::PersistenceFailure(a), Self::PersistenceFailure(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            (Self::LedgerInconsistency(a), Self::LedgerInconsistency(b)) => a == b,
            _ => false,
        }
    }
}
