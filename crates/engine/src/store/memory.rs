use std::{
    collections::HashMap,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    Activity, EngineError, Expense, Group, Member, MoneyCents, ResultEngine,
};

use super::{LedgerStore, revision_conflict};

#[derive(Debug, Default)]
struct State {
    groups: HashMap<Uuid, Group>,
    members: HashMap<Uuid, Member>,
    expenses: HashMap<Uuid, Expense>,
    activities: Vec<Activity>,
}

/// In-process [`LedgerStore`]. Every call is atomic on its own.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> ResultEngine<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| EngineError::PersistenceFailure("memory store poisoned".to_string()))
    }

    fn write(&self) -> ResultEngine<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| EngineError::PersistenceFailure("memory store poisoned".to_string()))
    }
}

fn sorted_members(mut members: Vec<Member>) -> Vec<Member> {
    members.sort_by(|a, b| {
        a.display_name
            .cmp(&b.display_name)
            .then_with(|| a.id.cmp(&b.id))
    });
    members
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert_group(&self, group: &Group) -> ResultEngine<()> {
        let mut state = self.write()?;
        if state.groups.contains_key(&group.id) {
            return Err(EngineError::PersistenceFailure(format!(
                "group {} already exists",
                group.id
            )));
        }
        state.groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn load_group(&self, group_id: Uuid) -> ResultEngine<Option<Group>> {
        Ok(self.read()?.groups.get(&group_id).cloned())
    }

    async fn update_group(&self, group: &Group) -> ResultEngine<()> {
        let mut state = self.write()?;
        let stored = state
            .groups
            .get_mut(&group.id)
            .ok_or_else(|| EngineError::GroupNotFound(group.id.to_string()))?;
        stored.name.clone_from(&group.name);
        stored.category.clone_from(&group.category);
        stored.description.clone_from(&group.description);
        stored.updated_at = group.updated_at;
        Ok(())
    }

    async fn delete_group(&self, group_id: Uuid) -> ResultEngine<()> {
        let mut state = self.write()?;
        if state.groups.remove(&group_id).is_none() {
            return Err(EngineError::GroupNotFound(group_id.to_string()));
        }
        state.members.retain(|_, m| m.group_id != group_id);
        state.expenses.retain(|_, e| e.group_id != group_id);
        state.activities.retain(|a| a.group_id != group_id);
        Ok(())
    }

    async fn insert_member(&self, member: &Member) -> ResultEngine<()> {
        let mut state = self.write()?;
        if !state.groups.contains_key(&member.group_id) {
            return Err(EngineError::GroupNotFound(member.group_id.to_string()));
        }
        state.members.insert(member.id, member.clone());
        Ok(())
    }

    async fn remove_member(&self, group_id: Uuid, member_id: Uuid) -> ResultEngine<()> {
        let mut state = self.write()?;
        match state.members.get(&member_id) {
            Some(member) if member.group_id == group_id => {
                state.members.remove(&member_id);
                Ok(())
            }
            _ => Err(EngineError::MemberNotFound(member_id.to_string())),
        }
    }

    async fn load_group_members(&self, group_id: Uuid) -> ResultEngine<Vec<Member>> {
        let state = self.read()?;
        Ok(sorted_members(
            state
                .members
                .values()
                .filter(|m| m.group_id == group_id)
                .cloned()
                .collect(),
        ))
    }

    async fn load_user_memberships(&self, user_id: &str) -> ResultEngine<Vec<Member>> {
        let state = self.read()?;
        let mut members: Vec<Member> = state
            .members
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.group_id);
        Ok(members)
    }

    async fn save_member_balance(
        &self,
        group_id: Uuid,
        member_id: Uuid,
        balance: MoneyCents,
    ) -> ResultEngine<()> {
        let mut state = self.write()?;
        match state.members.get_mut(&member_id) {
            Some(member) if member.group_id == group_id => {
                member.balance = balance;
                Ok(())
            }
            _ => Err(EngineError::MemberNotFound(member_id.to_string())),
        }
    }

    async fn load_expense(&self, expense_id: Uuid) -> ResultEngine<Option<Expense>> {
        Ok(self.read()?.expenses.get(&expense_id).cloned())
    }

    async fn save_expense(
        &self,
        expense: &Expense,
        expected_revision: Option<u32>,
    ) -> ResultEngine<()> {
        let mut state = self.write()?;
        let stored_revision = state.expenses.get(&expense.id).map(|e| e.revision);
        if stored_revision != expected_revision {
            return Err(revision_conflict(
                expense.id,
                expected_revision,
                stored_revision,
            ));
        }
        state.expenses.insert(expense.id, expense.clone());
        Ok(())
    }

    async fn delete_expense(&self, expense_id: Uuid) -> ResultEngine<()> {
        self.write()?
            .expenses
            .remove(&expense_id)
            .map(|_| ())
            .ok_or_else(|| EngineError::ExpenseNotFound(expense_id.to_string()))
    }

    async fn list_group_expenses(&self, group_id: Uuid) -> ResultEngine<Vec<Expense>> {
        let state = self.read()?;
        let mut expenses: Vec<Expense> = state
            .expenses
            .values()
            .filter(|e| e.group_id == group_id)
            .cloned()
            .collect();
        expenses.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(expenses)
    }

    async fn record_activity(&self, activity: &Activity) -> ResultEngine<()> {
        self.write()?.activities.push(activity.clone());
        Ok(())
    }

    async fn list_activity(&self, group_id: Uuid, limit: u64) -> ResultEngine<Vec<Activity>> {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(self
            .read()?
            .activities
            .iter()
            .rev()
            .filter(|a| a.group_id == group_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
