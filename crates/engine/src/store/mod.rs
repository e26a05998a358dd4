//! Persistence collaborator.
//!
//! The engine never touches storage directly; it goes through a
//! [`LedgerStore`]. Each call is its own unit of durability, except
//! [`LedgerStore::commit_expense`], which writes an expense together with the
//! balances it moves. Stores without transactions get the default
//! implementation: sequential writes, undone in reverse when one fails.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    Activity, BalanceChange, EngineError, Expense, Group, Member, MoneyCents, ResultEngine,
};

mod memory;
mod sql;

pub use memory::MemoryStore;
pub use sql::SqlStore;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_group(&self, group: &Group) -> ResultEngine<()>;

    async fn load_group(&self, group_id: Uuid) -> ResultEngine<Option<Group>>;

    /// Overwrites name, category, description and `updated_at`. Fails with
    /// `GroupNotFound` when the group does not exist.
    async fn update_group(&self, group: &Group) -> ResultEngine<()>;

    /// Deletes the group together with its members, expenses and activity.
    async fn delete_group(&self, group_id: Uuid) -> ResultEngine<()>;

    async fn insert_member(&self, member: &Member) -> ResultEngine<()>;

    /// Fails with `MemberNotFound` when the member is not part of the group.
    async fn remove_member(&self, group_id: Uuid, member_id: Uuid) -> ResultEngine<()>;

    /// Members ordered by display name.
    async fn load_group_members(&self, group_id: Uuid) -> ResultEngine<Vec<Member>>;

    /// Every membership of `user_id`, across groups.
    async fn load_user_memberships(&self, user_id: &str) -> ResultEngine<Vec<Member>>;

    /// Fails with `MemberNotFound` when no row was updated.
    async fn save_member_balance(
        &self,
        group_id: Uuid,
        member_id: Uuid,
        balance: MoneyCents,
    ) -> ResultEngine<()>;

    async fn load_expense(&self, expense_id: Uuid) -> ResultEngine<Option<Expense>>;

    /// Writes the expense and its splits atomically.
    ///
    /// `expected_revision` is `None` for a new record (conflict if the id
    /// exists) and the stored revision otherwise (conflict if it moved on).
    async fn save_expense(
        &self,
        expense: &Expense,
        expected_revision: Option<u32>,
    ) -> ResultEngine<()>;

    async fn delete_expense(&self, expense_id: Uuid) -> ResultEngine<()>;

    /// Expenses of a group, newest date first, reversed ones included.
    async fn list_group_expenses(&self, group_id: Uuid) -> ResultEngine<Vec<Expense>>;

    /// Saves `expense` (replacing `previous`, if any) and writes every
    /// balance change, all or nothing.
    ///
    /// Balances already written are restored in reverse order and the
    /// expense record is put back when a write fails; the original error is
    /// returned. A restore that fails itself is `LedgerInconsistency`.
    async fn commit_expense(
        &self,
        expense: &Expense,
        previous: Option<&Expense>,
        changes: &[BalanceChange],
    ) -> ResultEngine<()> {
        self.save_expense(expense, previous.map(|p| p.revision))
            .await?;

        for (index, change) in changes.iter().enumerate() {
            if let Err(err) = self
                .save_member_balance(expense.group_id, change.member_id, change.new)
                .await
            {
                tracing::warn!(
                    "balance write failed for expense {} (member {}): {err}; rolling back",
                    expense.id,
                    change.member_id
                );
                compensate(self, expense, previous, &changes[..index]).await?;
                return Err(err);
            }
        }
        Ok(())
    }

    async fn record_activity(&self, activity: &Activity) -> ResultEngine<()>;

    /// Newest first.
    async fn list_activity(&self, group_id: Uuid, limit: u64) -> ResultEngine<Vec<Activity>>;
}

async fn compensate<S: LedgerStore + ?Sized>(
    store: &S,
    expense: &Expense,
    previous: Option<&Expense>,
    written: &[BalanceChange],
) -> ResultEngine<()> {
    for change in written.iter().rev() {
        if let Err(err) = store
            .save_member_balance(expense.group_id, change.member_id, change.old)
            .await
        {
            tracing::error!(
                "failed to restore balance of member {} in group {}: {err}",
                change.member_id,
                expense.group_id
            );
            return Err(EngineError::LedgerInconsistency(format!(
                "rollback of expense {} left group {} partially applied",
                expense.id, expense.group_id
            )));
        }
    }

    let restored = match previous {
        None => store.delete_expense(expense.id).await,
        Some(previous) => store.save_expense(previous, Some(expense.revision)).await,
    };
    if let Err(err) = restored {
        tracing::error!("failed to restore expense {}: {err}", expense.id);
        return Err(EngineError::LedgerInconsistency(format!(
            "rollback of expense {} could not restore its record",
            expense.id
        )));
    }
    Ok(())
}

fn revision_conflict(expense_id: Uuid, expected: Option<u32>, stored: Option<u32>) -> EngineError {
    EngineError::ExpenseConflict(match (expected, stored) {
        (None, _) => format!("expense {expense_id} already exists"),
        (Some(expected), Some(stored)) => {
            format!("expense {expense_id} is at revision {stored}, expected {expected}")
        }
        (Some(_), None) => format!("expense {expense_id} no longer exists"),
    })
}
