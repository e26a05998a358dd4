use chrono::Utc;
use uuid::Uuid;

use crate::{
    Activity, ActivityKind, EngineError, Expense, ExpenseKind, ExpenseStatus, LedgerStore,
    Member, MoneyCents, NewExpenseCmd, ResultEngine, Split, SplitPolicy, SplitType, UpdateExpenseCmd,
    allocate, expense_deltas,
    util::{normalize_optional_text, normalize_required_name},
};

use super::Engine;

/// Every id must belong to `members`.
pub(super) fn ensure_members<'a>(
    members: &[Member],
    ids: impl IntoIterator<Item = &'a Uuid>,
) -> ResultEngine<()> {
    for id in ids {
        if !members.iter().any(|m| m.id == *id) {
            return Err(EngineError::MemberNotFound(id.to_string()));
        }
    }
    Ok(())
}

impl<S: LedgerStore> Engine<S> {
    /// Allocates the split, then records the expense and applies its deltas
    /// atomically.
    pub async fn create_expense(&self, cmd: NewExpenseCmd) -> ResultEngine<Expense> {
        let title = normalize_required_name(&cmd.title, "expense title")?;
        let splits = allocate(
            cmd.amount,
            &cmd.split.policy,
            &cmd.split.participants,
            cmd.paid_by,
        )?;

        let mut expense = Expense::new(
            cmd.group_id,
            title,
            cmd.amount,
            cmd.date,
            cmd.paid_by,
            cmd.split.policy.split_type(),
            splits,
        );
        expense.category = cmd.category;
        expense.notes = normalize_optional_text(cmd.notes.as_deref());
        expense.validate()?;

        let _guard = self.lock_group_write(cmd.group_id).await?;
        self.require_group(cmd.group_id).await?;
        let members = self.store.load_group_members(cmd.group_id).await?;
        ensure_members(&members, &cmd.split.participants)?;

        expense.status = ExpenseStatus::Active;
        expense.revision = 1;
        self.commit(&members, &expense, None, &expense_deltas(&expense))
            .await?;
        tracing::info!(
            "expense {} of {} created in group {}",
            expense.id,
            expense.amount,
            expense.group_id
        );

        self.record(Activity::new(
            expense.group_id,
            ActivityKind::ExpenseCreated,
            Some(expense.id),
            format!("\"{}\" added for {}", expense.title, expense.amount),
        ))
        .await;
        Ok(expense)
    }

    /// Replaces an active expense. The old deltas are reversed and the new
    /// ones applied as a single net change.
    pub async fn update_expense(&self, cmd: UpdateExpenseCmd) -> ResultEngine<Expense> {
        let _guard = self.lock_group_write(cmd.group_id).await?;
        self.require_group(cmd.group_id).await?;
        let old = self.require_expense(cmd.group_id, cmd.expense_id).await?;

        if let Some(expected) = cmd.expected_revision
            && expected != old.revision
        {
            return Err(EngineError::ExpenseConflict(format!(
                "expense {} is at revision {}, expected {expected}",
                old.id, old.revision
            )));
        }
        if old.status != ExpenseStatus::Active {
            return Err(EngineError::InvalidExpense(format!(
                "expense {} is {} and cannot be edited",
                old.id,
                old.status.as_str()
            )));
        }
        if old.kind == ExpenseKind::Settlement {
            return Err(EngineError::InvalidExpense(
                "settlements cannot be edited; delete and record a new one".to_string(),
            ));
        }

        let amount = cmd.amount.unwrap_or(old.amount);
        let paid_by = cmd.paid_by.unwrap_or(old.paid_by);
        let (split_type, splits) = match &cmd.split {
            Some(request) => (
                request.policy.split_type(),
                allocate(amount, &request.policy, &request.participants, paid_by)?,
            ),
            None => (old.split_type, reshape_splits(&old, amount, paid_by)?),
        };

        let mut new = old.clone();
        if let Some(title) = cmd.title.as_deref() {
            new.title = normalize_required_name(title, "expense title")?;
        }
        if let Some(category) = cmd.category {
            new.category = category;
        }
        if let Some(date) = cmd.date {
            new.date = date;
        }
        if cmd.clear_notes {
            new.notes = None;
        } else if cmd.notes.is_some() {
            new.notes = normalize_optional_text(cmd.notes.as_deref());
        }
        new.amount = amount;
        new.paid_by = paid_by;
        new.split_type = split_type;
        new.splits = splits;
        new.revision = old.revision + 1;
        new.updated_at = Utc::now();
        new.validate()?;

        let members = self.store.load_group_members(cmd.group_id).await?;
        ensure_members(&members, new.splits.iter().map(|s| &s.member_id))?;

        let deltas = expense_deltas(&old).negated().merge(&expense_deltas(&new));
        self.commit(&members, &new, Some(&old), &deltas).await?;
        tracing::info!(
            "expense {} updated to revision {} in group {}",
            new.id,
            new.revision,
            new.group_id
        );

        self.record(Activity::new(
            new.group_id,
            ActivityKind::ExpenseUpdated,
            Some(new.id),
            format!("\"{}\" updated", new.title),
        ))
        .await;
        Ok(new)
    }

    /// Reverses an expense's deltas and marks it `Reversed`. The record is
    /// kept for history.
    pub async fn delete_expense(&self, group_id: Uuid, expense_id: Uuid) -> ResultEngine<Expense> {
        let _guard = self.lock_group_write(group_id).await?;
        self.require_group(group_id).await?;
        let old = self.require_expense(group_id, expense_id).await?;
        if old.status != ExpenseStatus::Active {
            return Err(EngineError::InvalidExpense(format!(
                "expense {} is already {}",
                old.id,
                old.status.as_str()
            )));
        }

        let mut reversed = old.clone();
        reversed.status = ExpenseStatus::Reversed;
        reversed.revision = old.revision + 1;
        reversed.updated_at = Utc::now();

        let members = self.store.load_group_members(group_id).await?;
        let deltas = expense_deltas(&old).negated();
        self.commit(&members, &reversed, Some(&old), &deltas)
            .await?;
        tracing::info!("expense {expense_id} reversed in group {group_id}");

        self.record(Activity::new(
            group_id,
            ActivityKind::ExpenseDeleted,
            Some(expense_id),
            format!("\"{}\" deleted", reversed.title),
        ))
        .await;
        Ok(reversed)
    }

    pub async fn expense(&self, expense_id: Uuid) -> ResultEngine<Expense> {
        self.store
            .load_expense(expense_id)
            .await?
            .ok_or_else(|| EngineError::ExpenseNotFound(expense_id.to_string()))
    }

    /// Expenses of a group, newest first.
    pub async fn group_expenses(
        &self,
        group_id: Uuid,
        include_reversed: bool,
    ) -> ResultEngine<Vec<Expense>> {
        let _guard = self.lock_group_read(group_id).await?;
        self.require_group(group_id).await?;
        let mut expenses = self.store.list_group_expenses(group_id).await?;
        if !include_reversed {
            expenses.retain(Expense::is_active);
        }
        Ok(expenses)
    }
}

/// Splits for an update that did not supply a new split request.
///
/// Same amount: the stored shares are kept and only the payer flag moves.
/// New amount: `Equal` expenses are re-allocated across the same
/// participants; any other split type needs explicit new parameters.
fn reshape_splits(
    old: &Expense,
    amount: MoneyCents,
    paid_by: Uuid,
) -> ResultEngine<Vec<Split>> {
    if amount == old.amount {
        return Ok(old
            .splits
            .iter()
            .map(|s| Split::new(s.member_id, s.amount, s.member_id == paid_by))
            .collect());
    }
    if old.split_type != SplitType::Equal {
        return Err(EngineError::InvalidSplitParams(format!(
            "changing the amount of a {} split requires new split values",
            old.split_type
        )));
    }
    let participants: Vec<Uuid> = old.splits.iter().map(|s| s.member_id).collect();
    allocate(amount, &SplitPolicy::Equal, &participants, paid_by)
}
