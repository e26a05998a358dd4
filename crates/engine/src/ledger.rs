//! Balance deltas.
//!
//! Every expense contributes one signed delta per member it touches:
//!
//! ```text
//! delta[payer]  += amount
//! delta[member] -= split.amount   for every split, payer included
//! ```
//!
//! Reversal is the exact negation, and an update is `reverse(old) + apply(new)`
//! merged into a single net set before anything is written.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::{EngineError, Expense, Member, MoneyCents, ResultEngine};

/// Net balance change per member, ordered by member id so writes always
/// happen in the same order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BalanceDeltas(BTreeMap<Uuid, MoneyCents>);

impl BalanceDeltas {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, member_id: Uuid, delta: MoneyCents) {
        *self.0.entry(member_id).or_default() += delta;
    }

    #[must_use]
    pub fn get(&self, member_id: &Uuid) -> MoneyCents {
        self.0.get(member_id).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn negated(&self) -> Self {
        Self(self.0.iter().map(|(id, delta)| (*id, -*delta)).collect())
    }

    #[must_use]
    pub fn merge(mut self, other: &BalanceDeltas) -> Self {
        for (id, delta) in &other.0 {
            self.add(*id, *delta);
        }
        self
    }

    /// Sum of every delta. Zero for any reconciled expense.
    #[must_use]
    pub fn total(&self) -> MoneyCents {
        self.0.values().copied().sum()
    }

    /// Members whose balance actually changes.
    pub fn iter(&self) -> impl Iterator<Item = (Uuid, MoneyCents)> + '_ {
        self.0
            .iter()
            .filter(|(_, delta)| !delta.is_zero())
            .map(|(id, delta)| (*id, *delta))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// One member's balance before and after an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BalanceChange {
    pub member_id: Uuid,
    pub old: MoneyCents,
    pub new: MoneyCents,
}

/// Deltas an expense contributes while it is active.
#[must_use]
pub fn expense_deltas(expense: &Expense) -> BalanceDeltas {
    let mut deltas = BalanceDeltas::new();
    deltas.add(expense.paid_by, expense.amount);
    for split in &expense.splits {
        deltas.add(split.member_id, -split.amount);
    }
    deltas
}

/// Applies `deltas` to a snapshot of the group and returns the members whose
/// balance changes, with their new balance.
///
/// Fails with `MemberNotFound` when a delta targets someone outside the group
/// and with `LedgerInconsistency` when the resulting group no longer sums to
/// zero. Nothing is mutated on failure.
pub(crate) fn project_balances(
    members: &[Member],
    deltas: &BalanceDeltas,
) -> ResultEngine<Vec<BalanceChange>> {
    let mut changes = Vec::new();
    for (member_id, delta) in deltas.iter() {
        let member = members
            .iter()
            .find(|m| m.id == member_id)
            .ok_or_else(|| EngineError::MemberNotFound(member_id.to_string()))?;
        let next = member.balance.checked_add(delta).ok_or_else(|| {
            EngineError::InvalidAmount(format!("balance overflow for member {member_id}"))
        })?;
        changes.push(BalanceChange {
            member_id,
            old: member.balance,
            new: next,
        });
    }

    let projected: MoneyCents = members
        .iter()
        .map(|m| {
            changes
                .iter()
                .find(|change| change.member_id == m.id)
                .map_or(m.balance, |change| change.new)
        })
        .sum();
    if !projected.is_zero() {
        return Err(EngineError::LedgerInconsistency(format!(
            "group balances would sum to {projected}"
        )));
    }
    Ok(changes)
}

/// Fails with `LedgerInconsistency` when the balances do not sum to zero.
pub fn check_zero_sum(members: &[Member]) -> ResultEngine<()> {
    let total: MoneyCents = members.iter().map(|m| m.balance).sum();
    if total.is_zero() {
        Ok(())
    } else {
        Err(EngineError::LedgerInconsistency(format!(
            "group balances sum to {total}"
        )))
    }
}
