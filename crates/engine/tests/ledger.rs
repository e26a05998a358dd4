use chrono::{Duration, Utc};
use sea_orm::{Database, DatabaseConnection};

use engine::{
    ActivityKind, AddMemberCmd, BalanceChange, Engine, EngineError, Expense, ExpenseKind,
    ExpenseStatus, LedgerStore, Member, MoneyCents, NewExpenseCmd, NewGroupCmd, Percent,
    SettleCmd, Split, SplitPolicy, SplitRequest, SplitType, SqlStore, UpdateExpenseCmd,
    UpdateGroupCmd,
};
use migration::MigratorTrait;
use uuid::Uuid;

async fn engine_with_db() -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    (engine, db)
}

/// A group with three members: Alice, Bob and Carol (in that order).
async fn trip(engine: &Engine) -> (Uuid, Vec<Member>) {
    let group = engine
        .create_group(NewGroupCmd::new("Lisbon trip").category("Travel"))
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
    (group.id, members)
}

fn ids(members: &[Member]) -> Vec<Uuid> {
    members.iter().map(|m| m.id).collect()
}

async fn balances(engine: &Engine, group_id: Uuid, members: &[Member]) -> Vec<i64> {
    let snapshot = engine.group_balances(group_id).await.unwrap();
    members
        .iter()
        .map(|m| {
            snapshot
                .iter()
                .find(|s| s.id == m.id)
                .map(|s| s.balance.cents())
                .unwrap()
        })
        .collect()
}

fn dinner(group_id: Uuid, members: &[Member], amount: i64) -> NewExpenseCmd {
    NewExpenseCmd::new(
        group_id,
        "Dinner",
        MoneyCents::new(amount),
        members[0].id,
        SplitRequest::equal(ids(members)),
    )
}

#[tokio::test]
async fn equal_expense_then_settlement() {
    let (engine, _db) = engine_with_db().await;
    let (group_id, members) = trip(&engine).await;

    let expense = engine
        .create_expense(dinner(group_id, &members, 9000))
        .await
        .unwrap();
    assert_eq!(expense.status, ExpenseStatus::Active);
    assert_eq!(expense.revision, 1);
    assert_eq!(balances(&engine, group_id, &members).await, vec![6000, -3000, -3000]);

    let settlement = engine
        .settle_between(members[0].id, members[1].id, MoneyCents::new(3000), group_id)
        .await
        .unwrap();
    assert_eq!(settlement.kind, ExpenseKind::Settlement);
    assert_eq!(settlement.split_type, SplitType::Exact);
    assert_eq!(balances(&engine, group_id, &members).await, vec![9000, -6000, -3000]);

    engine.verify_group(group_id).await.unwrap();
}

#[tokio::test]
async fn expenses_round_trip_through_storage() {
    let (engine, _db) = engine_with_db().await;
    let (group_id, members) = trip(&engine).await;

    let created = engine
        .create_expense(dinner(group_id, &members, 1000).notes("  tip included "))
        .await
        .unwrap();
    let loaded = engine.expense(created.id).await.unwrap();

    assert_eq!(loaded.notes.as_deref(), Some("tip included"));
    assert_eq!(
        loaded.splits.iter().map(|s| s.amount.cents()).collect::<Vec<_>>(),
        vec![334, 333, 333]
    );
    assert!(loaded.splits[0].is_payer);
    assert_eq!(loaded.splits.iter().filter(|s| s.is_payer).count(), 1);
}

#[tokio::test]
async fn update_matches_reverse_then_apply() {
    let (engine, _db) = engine_with_db().await;
    let (group_id, members) = trip(&engine).await;

    let expense = engine
        .create_expense(dinner(group_id, &members, 9000))
        .await
        .unwrap();

    let policy = SplitPolicy::Exact(vec![
        MoneyCents::new(1000),
        MoneyCents::new(0),
        MoneyCents::new(5000),
    ]);
    let updated = engine
        .update_expense(
            UpdateExpenseCmd::new(group_id, expense.id)
                .expected_revision(1)
                .amount(MoneyCents::new(6000))
                .paid_by(members[1].id)
                .split(SplitRequest::new(policy.clone(), ids(&members))),
        )
        .await
        .unwrap();
    assert_eq!(updated.revision, 2);
    let after_update = balances(&engine, group_id, &members).await;

    // Same outcome built by hand on a fresh group.
    let (engine2, _db2) = engine_with_db().await;
    let (group2, members2) = trip(&engine2).await;
    let first = engine2
        .create_expense(dinner(group2, &members2, 9000))
        .await
        .unwrap();
    engine2.delete_expense(group2, first.id).await.unwrap();
    engine2
        .create_expense(NewExpenseCmd::new(
            group2,
            "Dinner",
            MoneyCents::new(6000),
            members2[1].id,
            SplitRequest::new(policy, ids(&members2)),
        ))
        .await
        .unwrap();

    assert_eq!(after_update, balances(&engine2, group2, &members2).await);
    assert_eq!(after_update, vec![-1000, 6000, -5000]);
    engine.verify_group(group_id).await.unwrap();
}

#[tokio::test]
async fn stale_revision_is_a_conflict() {
    let (engine, _db) = engine_with_db().await;
    let (group_id, members) = trip(&engine).await;
    let expense = engine
        .create_expense(dinner(group_id, &members, 9000))
        .await
        .unwrap();

    engine
        .update_expense(UpdateExpenseCmd::new(group_id, expense.id).title("Late dinner"))
        .await
        .unwrap();
    let err = engine
        .update_expense(
            UpdateExpenseCmd::new(group_id, expense.id)
                .expected_revision(1)
                .amount(MoneyCents::new(3000)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::ExpenseConflict(_)));
    assert!(err.is_retryable());
    assert_eq!(balances(&engine, group_id, &members).await, vec![6000, -3000, -3000]);
}

#[tokio::test]
async fn delete_restores_balances_and_is_terminal() {
    let (engine, _db) = engine_with_db().await;
    let (group_id, members) = trip(&engine).await;

    let expense = engine
        .create_expense(dinner(group_id, &members, 9000))
        .await
        .unwrap();
    let reversed = engine.delete_expense(group_id, expense.id).await.unwrap();
    assert_eq!(reversed.status, ExpenseStatus::Reversed);
    assert_eq!(balances(&engine, group_id, &members).await, vec![0, 0, 0]);

    let err = engine.delete_expense(group_id, expense.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidExpense(_)));
    let err = engine
        .update_expense(UpdateExpenseCmd::new(group_id, expense.id).title("Again"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidExpense(_)));

    assert!(engine.group_expenses(group_id, false).await.unwrap().is_empty());
    assert_eq!(engine.group_expenses(group_id, true).await.unwrap().len(), 1);
    engine.verify_group(group_id).await.unwrap();
}

#[tokio::test]
async fn percentage_splits_must_reconcile_before_recording() {
    let (engine, _db) = engine_with_db().await;
    let (group_id, members) = trip(&engine).await;

    let third = |raw: &str| raw.parse::<Percent>().unwrap();
    let exact = SplitPolicy::Percentage(vec![third("33.33"), third("33.33"), third("33.34")]);
    let expense = engine
        .create_expense(NewExpenseCmd::new(
            group_id,
            "Groceries",
            MoneyCents::new(10_000),
            members[0].id,
            SplitRequest::new(exact, ids(&members)),
        ))
        .await
        .unwrap();
    assert_eq!(
        expense.splits.iter().map(|s| s.amount.cents()).collect::<Vec<_>>(),
        vec![3333, 3333, 3334]
    );

    // 33.33% of 0.10 rounds to 0.03 each: 0.09 total, one cent short.
    let drifting = SplitPolicy::Percentage(vec![third("33.33"), third("33.33"), third("33.34")]);
    let err = engine
        .create_expense(NewExpenseCmd::new(
            group_id,
            "Gum",
            MoneyCents::new(10),
            members[0].id,
            SplitRequest::new(drifting, ids(&members)),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidSplitParams(_)));
    assert_eq!(balances(&engine, group_id, &members).await, vec![6667, -3333, -3334]);
    assert_eq!(engine.group_expenses(group_id, true).await.unwrap().len(), 1);
}

#[tokio::test]
async fn validation_happens_before_any_write() {
    let (engine, _db) = engine_with_db().await;
    let (group_id, members) = trip(&engine).await;

    let stranger = Uuid::new_v4();
    let err = engine
        .create_expense(NewExpenseCmd::new(
            group_id,
            "Taxi",
            MoneyCents::new(2000),
            members[0].id,
            SplitRequest::equal(vec![members[0].id, stranger]),
        ))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::MemberNotFound(stranger.to_string()));

    let err = engine
        .settle(SettleCmd::new(group_id, members[0].id, members[0].id, MoneyCents::new(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidSettlement(_)));

    let err = engine
        .settle(SettleCmd::new(group_id, members[0].id, members[1].id, MoneyCents::ZERO))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidSettlement(_)));

    let err = engine
        .create_expense(dinner(Uuid::new_v4(), &members, 100))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::GroupNotFound(_)));

    assert_eq!(balances(&engine, group_id, &members).await, vec![0, 0, 0]);
    assert!(engine.group_expenses(group_id, true).await.unwrap().is_empty());
}

#[tokio::test]
async fn members_with_a_balance_cannot_leave() {
    let (engine, _db) = engine_with_db().await;
    let (group_id, members) = trip(&engine).await;
    engine
        .create_expense(dinner(group_id, &members, 9000))
        .await
        .unwrap();

    let err = engine.remove_member(group_id, members[1].id).await.unwrap_err();
    assert!(matches!(err, EngineError::NonZeroBalanceOnRemoval(_)));
    let err = engine.delete_group(group_id).await.unwrap_err();
    assert!(matches!(err, EngineError::NonZeroBalanceOnRemoval(_)));

    engine
        .settle_between(members[1].id, members[0].id, MoneyCents::new(3000), group_id)
        .await
        .unwrap();
    engine.remove_member(group_id, members[1].id).await.unwrap();

    let remaining = engine.members(group_id).await.unwrap();
    assert_eq!(remaining.len(), 2);
    engine.verify_group(group_id).await.unwrap();
}

#[tokio::test]
async fn deleting_a_settled_group_removes_everything() {
    let (engine, _db) = engine_with_db().await;
    let (group_id, members) = trip(&engine).await;
    let expense = engine
        .create_expense(dinner(group_id, &members, 9000))
        .await
        .unwrap();
    engine.delete_expense(group_id, expense.id).await.unwrap();

    engine.delete_group(group_id).await.unwrap();
    assert!(matches!(
        engine.group(group_id).await.unwrap_err(),
        EngineError::GroupNotFound(_)
    ));
    assert!(matches!(
        engine.expense(expense.id).await.unwrap_err(),
        EngineError::ExpenseNotFound(_)
    ));
}

#[tokio::test]
async fn user_summary_spans_groups() {
    let (engine, _db) = engine_with_db().await;
    let (trip_id, trip_members) = trip(&engine).await;
    engine
        .create_expense(dinner(trip_id, &trip_members, 9000))
        .await
        .unwrap();

    let flat = engine.create_group(NewGroupCmd::new("Flat")).await.unwrap();
    let alice = engine
        .add_member(AddMemberCmd::new(flat.id, "alice", "Alice"))
        .await
        .unwrap();
    let dave = engine
        .add_member(AddMemberCmd::new(flat.id, "dave", "Dave"))
        .await
        .unwrap();
    engine
        .create_expense(NewExpenseCmd::new(
            flat.id,
            "Rent",
            MoneyCents::new(100_000),
            dave.id,
            SplitRequest::equal(vec![dave.id, alice.id]),
        ))
        .await
        .unwrap();

    let summary = engine.user_summary("alice").await.unwrap();
    assert_eq!(summary.owed_to_you.cents(), 6000);
    assert_eq!(summary.you_owe.cents(), 50_000);
    assert_eq!(summary.total.cents(), -44_000);
}

#[tokio::test]
async fn equal_update_without_split_reallocates() {
    let (engine, _db) = engine_with_db().await;
    let (group_id, members) = trip(&engine).await;
    let expense = engine
        .create_expense(
            dinner(group_id, &members, 9000).date(Utc::now() - Duration::days(1)),
        )
        .await
        .unwrap();

    let updated = engine
        .update_expense(UpdateExpenseCmd::new(group_id, expense.id).amount(MoneyCents::new(1000)))
        .await
        .unwrap();
    assert_eq!(
        updated.splits.iter().map(|s| s.amount.cents()).collect::<Vec<_>>(),
        vec![334, 333, 333]
    );
    assert_eq!(balances(&engine, group_id, &members).await, vec![666, -333, -333]);
}

#[tokio::test]
async fn activity_feed_lists_newest_first() {
    let (engine, _db) = engine_with_db().await;
    let (group_id, members) = trip(&engine).await;
    let expense = engine
        .create_expense(dinner(group_id, &members, 9000))
        .await
        .unwrap();
    engine.delete_expense(group_id, expense.id).await.unwrap();

    let feed = engine.group_activity(group_id, 2).await.unwrap();
    assert_eq!(feed.len(), 2);
    assert_eq!(feed[0].kind, ActivityKind::ExpenseDeleted);
    assert_eq!(feed[1].kind, ActivityKind::ExpenseCreated);
    assert_eq!(feed[0].target_id, Some(expense.id));

    let all = engine.group_activity(group_id, 50).await.unwrap();
    assert_eq!(all.last().map(|a| a.kind), Some(ActivityKind::GroupCreated));
}

#[tokio::test]
async fn update_group_edits_and_touches() {
    let (engine, _db) = engine_with_db().await;
    let (group_id, _) = trip(&engine).await;
    let before = engine.group(group_id).await.unwrap();

    let updated = engine
        .update_group(
            UpdateGroupCmd::new(group_id)
                .name("  Porto\u{301} trip ")
                .category("")
                .description("Long weekend"),
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Port\u{f3} trip");
    assert_eq!(updated.category, None);
    assert_eq!(updated.description.as_deref(), Some("Long weekend"));
    assert!(updated.updated_at > before.updated_at);

    let stored = engine.group(group_id).await.unwrap();
    assert_eq!(stored.name, updated.name);
    assert_eq!(stored.category, None);
    assert_eq!(stored.created_at, before.created_at);
    assert!(stored.updated_at > before.updated_at);

    let feed = engine.group_activity(group_id, 1).await.unwrap();
    assert_eq!(feed[0].kind, ActivityKind::GroupUpdated);

    let err = engine
        .update_group(UpdateGroupCmd::new(group_id).name("   "))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidName(_)));

    let err = engine
        .update_group(UpdateGroupCmd::new(Uuid::new_v4()).name("Nowhere"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::GroupNotFound(_)));
}

#[tokio::test]
async fn sql_commit_is_all_or_nothing() {
    let (engine, db) = engine_with_db().await;
    let (group_id, members) = trip(&engine).await;
    let store = SqlStore::new(db);

    let amount = MoneyCents::new(2000);
    let mut expense = Expense::new(
        group_id,
        "Taxi".to_string(),
        amount,
        Utc::now(),
        members[0].id,
        SplitType::Exact,
        vec![
            Split::new(members[0].id, MoneyCents::ZERO, true),
            Split::new(members[1].id, amount, false),
        ],
    );
    expense.status = ExpenseStatus::Active;
    expense.revision = 1;

    // The second balance row does not exist, so the transaction aborts
    // after the expense row and the first balance were written.
    let changes = [
        BalanceChange {
            member_id: members[0].id,
            old: MoneyCents::ZERO,
            new: amount,
        },
        BalanceChange {
            member_id: Uuid::new_v4(),
            old: MoneyCents::ZERO,
            new: -amount,
        },
    ];
    let err = store
        .commit_expense(&expense, None, &changes)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MemberNotFound(_)));
    assert!(store.load_expense(expense.id).await.unwrap().is_none());
    assert_eq!(balances(&engine, group_id, &members).await, vec![0, 0, 0]);
}
