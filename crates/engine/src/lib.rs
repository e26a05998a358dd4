//! Shared-expense split allocator and balance ledger.
//!
//! [`allocate`] partitions an amount across group members; [`Engine`] records
//! the resulting expenses and keeps every member's running balance so that a
//! group always sums to zero.

pub use activities::{Activity, ActivityKind};
pub use allocation::{SplitPolicy, SplitType, allocate};
pub use commands::{
    AddMemberCmd, NewExpenseCmd, NewGroupCmd, SettleCmd, SplitRequest, UpdateExpenseCmd,
    UpdateGroupCmd,
};
pub use error::EngineError;
pub use expenses::{Expense, ExpenseCategory, ExpenseKind, ExpenseStatus, SETTLEMENT_TITLE};
pub use groups::Group;
pub use ledger::{BalanceChange, BalanceDeltas, check_zero_sum, expense_deltas};
pub use members::Member;
pub use money::{MoneyCents, Percent};
pub use ops::{BalanceSummary, Engine, EngineBuilder};
pub use splits::{Split, reconciles, splits_total};
pub use store::{LedgerStore, MemoryStore, SqlStore};

mod activities;
mod allocation;
mod commands;
mod error;
mod expenses;
mod groups;
mod ledger;
mod members;
mod money;
mod ops;
mod splits;
mod store;
mod util;

pub type ResultEngine<T> = Result<T, EngineError>;
