use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::Notify;
use uuid::Uuid;

use engine::{
    Activity, AddMemberCmd, BalanceSummary, Engine, EngineError, Expense, ExpenseStatus, Group,
    LedgerStore, Member, MemoryStore, MoneyCents, NewExpenseCmd, NewGroupCmd, ResultEngine,
    SplitRequest, UpdateExpenseCmd,
};

/// Memory store that fails selected calls.
///
/// `fail_balance_write` is the 1-based index of the `save_member_balance`
/// call that fails, counted from the last `arm`; `0` never fails. With
/// `hold_failure` set, that call signals `reached` and waits for `release`
/// before failing.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    balance_writes: AtomicUsize,
    fail_balance_write: AtomicUsize,
    fail_compensation: AtomicBool,
    fail_activity: AtomicBool,
    hold_failure: AtomicBool,
    reached: Notify,
    release: Notify,
}

impl FlakyStore {
    fn arm(&self, nth_balance_write: usize) {
        self.balance_writes.store(0, Ordering::SeqCst);
        self.fail_balance_write.store(nth_balance_write, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerStore for FlakyStore {
    async fn insert_group(&self, group: &Group) -> ResultEngine<()> {
        self.inner.insert_group(group).await
    }

    async fn load_group(&self, group_id: Uuid) -> ResultEngine<Option<Group>> {
        self.inner.load_group(group_id).await
    }

    async fn update_group(&self, group: &Group) -> ResultEngine<()> {
        self.inner.update_group(group).await
    }

    async fn delete_group(&self, group_id: Uuid) -> ResultEngine<()> {
        self.inner.delete_group(group_id).await
    }

    async fn insert_member(&self, member: &Member) -> ResultEngine<()> {
        self.inner.insert_member(member).await
    }

    async fn remove_member(&self, group_id: Uuid, member_id: Uuid) -> ResultEngine<()> {
        self.inner.remove_member(group_id, member_id).await
    }

    async fn load_group_members(&self, group_id: Uuid) -> ResultEngine<Vec<Member>> {
        self.inner.load_group_members(group_id).await
    }

    async fn load_user_memberships(&self, user_id: &str) -> ResultEngine<Vec<Member>> {
        self.inner.load_user_memberships(user_id).await
    }

    async fn save_member_balance(
        &self,
        group_id: Uuid,
        member_id: Uuid,
        balance: MoneyCents,
    ) -> ResultEngine<()> {
        let call = self.balance_writes.fetch_add(1, Ordering::SeqCst) + 1;
        let fail_at = self.fail_balance_write.load(Ordering::SeqCst);
        let failing = fail_at != 0
            && (call == fail_at
                || (call > fail_at && self.fail_compensation.load(Ordering::SeqCst)));
        if failing {
            if call == fail_at && self.hold_failure.load(Ordering::SeqCst) {
                self.reached.notify_one();
                self.release.notified().await;
            }
            return Err(EngineError::PersistenceFailure(format!(
                "injected failure on balance write {call}"
            )));
        }
        self.inner
            .save_member_balance(group_id, member_id, balance)
            .await
    }

    async fn load_expense(&self, expense_id: Uuid) -> ResultEngine<Option<Expense>> {
        self.inner.load_expense(expense_id).await
    }

    async fn save_expense(
        &self,
        expense: &Expense,
        expected_revision: Option<u32>,
    ) -> ResultEngine<()> {
        self.inner.save_expense(expense, expected_revision).await
    }

    async fn delete_expense(&self, expense_id: Uuid) -> ResultEngine<()> {
        self.inner.delete_expense(expense_id).await
    }

    async fn list_group_expenses(&self, group_id: Uuid) -> ResultEngine<Vec<Expense>> {
        self.inner.list_group_expenses(group_id).await
    }

    async fn record_activity(&self, activity: &Activity) -> ResultEngine<()> {
        if self.fail_activity.load(Ordering::SeqCst) {
            return Err(EngineError::PersistenceFailure(
                "injected activity failure".to_string(),
            ));
        }
        self.inner.record_activity(activity).await
    }

    async fn list_activity(&self, group_id: Uuid, limit: u64) -> ResultEngine<Vec<Activity>> {
        self.inner.list_activity(group_id, limit).await
    }
}

async fn setup() -> (Engine<FlakyStore>, Uuid, Vec<Member>) {
    let engine = Engine::with_store(FlakyStore::default());
    let group = engine
        .create_group(NewGroupCmd::new("Flat"))
        .await
        .unwrap();
    let mut members = Vec::new();
    for (user, name) in [("alice", "Alice"), ("bob", "Bob"), ("carol", "Carol")] {
        members.push(
            engine
                .add_member(AddMemberCmd::new(group.id, user, name))
                .await
                .unwrap(),
        );
    }
    (engine, group.id, members)
}

fn equal_expense(group_id: Uuid, members: &[Member], amount: i64) -> NewExpenseCmd {
    NewExpenseCmd::new(
        group_id,
        "Groceries",
        MoneyCents::new(amount),
        members[0].id,
        SplitRequest::equal(members.iter().map(|m| m.id).collect()),
    )
}

async fn balances(engine: &Engine<FlakyStore>, group_id: Uuid) -> Vec<(Uuid, i64)> {
    engine
        .group_balances(group_id)
        .await
        .unwrap()
        .into_iter()
        .map(|m| (m.id, m.balance.cents()))
        .collect()
}

#[tokio::test]
async fn failed_create_leaves_no_trace() {
    let (engine, group_id, members) = setup().await;
    let before = balances(&engine, group_id).await;

    engine.store().arm(3);
    let err = engine
        .create_expense(equal_expense(group_id, &members, 9000))
        .await
        .unwrap_err();
    engine.store().arm(0);

    assert!(matches!(err, EngineError::PersistenceFailure(_)));
    assert!(err.is_retryable());
    assert_eq!(balances(&engine, group_id).await, before);
    assert!(engine.group_expenses(group_id, true).await.unwrap().is_empty());
    engine.verify_group(group_id).await.unwrap();
}

#[tokio::test]
async fn failed_update_restores_previous_version() {
    let (engine, group_id, members) = setup().await;
    let expense = engine
        .create_expense(equal_expense(group_id, &members, 9000))
        .await
        .unwrap();
    let before = balances(&engine, group_id).await;

    engine.store().arm(2);
    let err = engine
        .update_expense(
            UpdateExpenseCmd::new(group_id, expense.id).amount(MoneyCents::new(3000)),
        )
        .await
        .unwrap_err();
    engine.store().arm(0);

    assert!(matches!(err, EngineError::PersistenceFailure(_)));
    assert_eq!(balances(&engine, group_id).await, before);
    let stored = engine.expense(expense.id).await.unwrap();
    assert_eq!(stored.revision, expense.revision);
    assert_eq!(stored.amount, expense.amount);
    engine.verify_group(group_id).await.unwrap();
}

#[tokio::test]
async fn failed_delete_keeps_expense_active() {
    let (engine, group_id, members) = setup().await;
    let expense = engine
        .create_expense(equal_expense(group_id, &members, 9000))
        .await
        .unwrap();
    let before = balances(&engine, group_id).await;

    engine.store().arm(2);
    engine.delete_expense(group_id, expense.id).await.unwrap_err();
    engine.store().arm(0);

    assert_eq!(balances(&engine, group_id).await, before);
    let stored = engine.expense(expense.id).await.unwrap();
    assert_eq!(stored.status, ExpenseStatus::Active);

    // The operation can simply be retried.
    engine.delete_expense(group_id, expense.id).await.unwrap();
    assert!(
        balances(&engine, group_id)
            .await
            .iter()
            .all(|(_, balance)| *balance == 0)
    );
}

#[tokio::test]
async fn failed_rollback_is_reported_as_inconsistency() {
    let (engine, group_id, members) = setup().await;

    engine
        .store()
        .fail_compensation
        .store(true, Ordering::SeqCst);
    engine.store().arm(2);
    let err = engine
        .create_expense(equal_expense(group_id, &members, 9000))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::LedgerInconsistency(_)));
    assert!(!err.user_message().contains("rollback"));
}

#[tokio::test]
async fn activity_failure_does_not_undo_the_expense() {
    let (engine, group_id, members) = setup().await;

    engine.store().fail_activity.store(true, Ordering::SeqCst);
    let expense = engine
        .create_expense(equal_expense(group_id, &members, 9000))
        .await
        .unwrap();

    assert_eq!(expense.status, ExpenseStatus::Active);
    assert_eq!(engine.group_expenses(group_id, false).await.unwrap().len(), 1);
    engine.verify_group(group_id).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn summaries_never_see_a_half_applied_expense() {
    let (engine, group_id, members) = setup().await;
    let engine = Arc::new(engine);

    engine.store().hold_failure.store(true, Ordering::SeqCst);
    engine.store().arm(2);
    let create = tokio::spawn({
        let engine = Arc::clone(&engine);
        let cmd = equal_expense(group_id, &members, 9000);
        async move { engine.create_expense(cmd).await }
    });
    // One balance is written; the second write is parked.
    engine.store().reached.notified().await;

    let summaries = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move {
            let mut out = Vec::new();
            for user in ["alice", "bob", "carol"] {
                out.push(engine.user_summary(user).await.unwrap());
            }
            out
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!summaries.is_finished());

    engine.store().release.notify_one();
    let err = create.await.unwrap().unwrap_err();
    assert!(matches!(err, EngineError::PersistenceFailure(_)));

    for summary in summaries.await.unwrap() {
        assert_eq!(summary, BalanceSummary::default());
    }
    engine.store().arm(0);
    engine.verify_group(group_id).await.unwrap();
}
