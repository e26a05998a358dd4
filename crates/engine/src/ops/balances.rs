use std::collections::BTreeSet;

use serde::Serialize;
use uuid::Uuid;

use crate::{
    BalanceDeltas, EngineError, LedgerStore, Member, MoneyCents, ResultEngine, check_zero_sum,
    expense_deltas,
};

use super::Engine;

/// A user's position across every group they belong to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BalanceSummary {
    /// Net position: positive when others owe the user.
    pub total: MoneyCents,
    /// Sum of the positive group balances.
    pub owed_to_you: MoneyCents,
    /// Sum of the negative group balances, as a positive amount.
    pub you_owe: MoneyCents,
}

impl BalanceSummary {
    fn from_balances(balances: impl IntoIterator<Item = MoneyCents>) -> Self {
        let mut summary = Self::default();
        for balance in balances {
            summary.total += balance;
            if balance.is_positive() {
                summary.owed_to_you += balance;
            } else {
                summary.you_owe += balance.abs();
            }
        }
        summary
    }
}

impl<S: LedgerStore> Engine<S> {
    /// Snapshot of every member's balance, taken between two mutations.
    pub async fn group_balances(&self, group_id: Uuid) -> ResultEngine<Vec<Member>> {
        let _guard = self.lock_group_read(group_id).await?;
        self.require_group(group_id).await?;
        self.store.load_group_members(group_id).await
    }

    /// Totals across every group the user belongs to.
    ///
    /// Holds the read lock of each of those groups, taken in id order, while
    /// the balances are read, so no group is seen halfway through a
    /// mutation.
    pub async fn user_summary(&self, user_id: &str) -> ResultEngine<BalanceSummary> {
        let group_ids: BTreeSet<Uuid> = self
            .store
            .load_user_memberships(user_id)
            .await?
            .iter()
            .map(|m| m.group_id)
            .collect();

        let mut locked = Vec::with_capacity(group_ids.len());
        for group_id in group_ids {
            match self.lock_group_read(group_id).await {
                Ok(guard) => locked.push((group_id, guard)),
                // Deleted since the memberships were listed.
                Err(EngineError::GroupNotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }

        let mut balances = Vec::new();
        for (group_id, _guard) in &locked {
            balances.extend(
                self.store
                    .load_group_members(*group_id)
                    .await?
                    .into_iter()
                    .filter(|m| m.user_id == user_id)
                    .map(|m| m.balance),
            );
        }
        Ok(BalanceSummary::from_balances(balances))
    }

    /// Replays the active expenses of a group and compares the result with
    /// the stored balances.
    ///
    /// Never repairs anything: a mismatch is reported as
    /// `LedgerInconsistency`.
    pub async fn verify_group(&self, group_id: Uuid) -> ResultEngine<()> {
        let _guard = self.lock_group_read(group_id).await?;
        self.require_group(group_id).await?;

        let members = self.store.load_group_members(group_id).await?;
        check_zero_sum(&members)?;

        let mut replayed = BalanceDeltas::new();
        for expense in self.store.list_group_expenses(group_id).await? {
            if expense.is_active() {
                replayed = replayed.merge(&expense_deltas(&expense));
            }
        }

        for member in &members {
            let expected = replayed.get(&member.id);
            if member.balance != expected {
                tracing::error!(
                    "member {} in group {group_id} has balance {}, replay gives {expected}",
                    member.id,
                    member.balance
                );
                return Err(EngineError::LedgerInconsistency(format!(
                    "stored balance of member {} does not match its expenses",
                    member.id
                )));
            }
        }
        if let Some((member_id, delta)) = replayed
            .iter()
            .find(|(id, _)| !members.iter().any(|m| m.id == *id))
        {
            return Err(EngineError::LedgerInconsistency(format!(
                "active expenses still assign {delta} to removed member {member_id}"
            )));
        }
        Ok(())
    }
}
