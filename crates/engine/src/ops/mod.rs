use std::{collections::HashMap, sync::Arc};

use sea_orm::DatabaseConnection;
use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

use crate::{
    Activity, BalanceDeltas, EngineError, Expense, Group, LedgerStore, Member, ResultEngine,
    SqlStore, ledger::project_balances,
};

mod activity;
mod balances;
mod expenses;
mod groups;
mod settlements;

pub use balances::BalanceSummary;

/// The split ledger service.
///
/// Mutations on a group run one at a time under that group's write lock;
/// balance reads take the read lock and therefore always observe a state
/// between two operations. Different groups never wait on each other.
pub struct Engine<S: LedgerStore = SqlStore> {
    store: S,
    locks: Mutex<HashMap<Uuid, Arc<RwLock<()>>>>,
}

impl Engine<SqlStore> {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }
}

impl<S: LedgerStore> Engine<S> {
    pub fn with_store(store: S) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Lock for an existing group.
    ///
    /// Entries nobody holds are pruned whenever a new one is created, so the
    /// table only tracks groups that are in use. Unknown ids never get an
    /// entry.
    async fn group_lock(&self, group_id: Uuid) -> ResultEngine<Arc<RwLock<()>>> {
        if let Some(lock) = self.locks.lock().await.get(&group_id) {
            return Ok(Arc::clone(lock));
        }
        self.require_group(group_id).await?;

        let mut locks = self.locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(Arc::clone(locks.entry(group_id).or_default()))
    }

    async fn lock_group_write(&self, group_id: Uuid) -> ResultEngine<OwnedRwLockWriteGuard<()>> {
        Ok(self.group_lock(group_id).await?.write_owned().await)
    }

    async fn lock_group_read(&self, group_id: Uuid) -> ResultEngine<OwnedRwLockReadGuard<()>> {
        Ok(self.group_lock(group_id).await?.read_owned().await)
    }

    /// Drops the lock entry of a deleted group. Call with its write guard
    /// held.
    async fn forget_group_lock(&self, group_id: Uuid) {
        self.locks.lock().await.remove(&group_id);
    }

    async fn require_group(&self, group_id: Uuid) -> ResultEngine<Group> {
        self.store
            .load_group(group_id)
            .await?
            .ok_or_else(|| EngineError::GroupNotFound(group_id.to_string()))
    }

    async fn require_expense(&self, group_id: Uuid, expense_id: Uuid) -> ResultEngine<Expense> {
        match self.store.load_expense(expense_id).await? {
            Some(expense) if expense.group_id == group_id => Ok(expense),
            _ => Err(EngineError::ExpenseNotFound(expense_id.to_string())),
        }
    }

    /// Persists `expense` and applies `deltas` to the group balances as one
    /// unit. The caller must hold the group write lock.
    ///
    /// `previous` is the stored version being replaced (`None` on create).
    /// Every touched member is checked and the new balances computed before
    /// the store sees the first write.
    async fn commit(
        &self,
        members: &[Member],
        expense: &Expense,
        previous: Option<&Expense>,
        deltas: &BalanceDeltas,
    ) -> ResultEngine<()> {
        let changes = project_balances(members, deltas)?;
        self.store.commit_expense(expense, previous, &changes).await
    }

    /// Activity is written after commit; losing it never undoes the
    /// operation it describes.
    async fn record(&self, activity: Activity) {
        if let Err(err) = self.store.record_activity(&activity).await {
            tracing::warn!(
                "failed to record {} activity for group {}: {err}",
                activity.kind.as_str(),
                activity.group_id
            );
        }
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine::with_store(SqlStore::new(self.database)))
    }
}
