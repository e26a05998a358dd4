use proptest::prelude::*;
use uuid::Uuid;

use engine::{
    AddMemberCmd, Engine, EngineError, MemoryStore, MoneyCents, NewExpenseCmd, NewGroupCmd,
    SettleCmd, SplitPolicy, SplitRequest, UpdateExpenseCmd, check_zero_sum,
};

const PEOPLE: usize = 4;

#[derive(Clone, Debug)]
enum Step {
    Create {
        amount: i64,
        payer: usize,
        participants: Vec<usize>,
        shares: Option<Vec<u32>>,
    },
    Update {
        pick: usize,
        amount: i64,
    },
    Delete {
        pick: usize,
    },
    Settle {
        from: usize,
        to: usize,
        amount: i64,
    },
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (
            1i64..50_000,
            0..PEOPLE,
            proptest::sample::subsequence((0..PEOPLE).collect::<Vec<_>>(), 1..=PEOPLE),
            prop::collection::vec(1u32..5, PEOPLE),
            any::<bool>(),
        )
            .prop_map(|(amount, payer, participants, weights, by_shares)| {
                let shares = by_shares.then(|| weights[..participants.len()].to_vec());
                Step::Create {
                    amount,
                    payer,
                    participants,
                    shares,
                }
            }),
        1 => (any::<usize>(), 1i64..50_000).prop_map(|(pick, amount)| Step::Update { pick, amount }),
        1 => any::<usize>().prop_map(|pick| Step::Delete { pick }),
        1 => (0..PEOPLE, 0..PEOPLE, 1i64..20_000)
            .prop_map(|(from, to, amount)| Step::Settle { from, to, amount }),
    ]
}

/// Rejections are expected along the way; losing track of money is not.
fn expected_rejection(err: &EngineError) -> bool {
    !matches!(
        err,
        EngineError::LedgerInconsistency(_)
            | EngineError::PersistenceFailure(_)
            | EngineError::Database(_)
    )
}

async fn replay(steps: Vec<Step>) -> Result<(), TestCaseError> {
    let engine = Engine::with_store(MemoryStore::new());
    let group = engine.create_group(NewGroupCmd::new("House")).await.unwrap();
    let mut people: Vec<Uuid> = Vec::new();
    for i in 0..PEOPLE {
        let member = engine
            .add_member(AddMemberCmd::new(group.id, format!("user{i}"), format!("User {i}")))
            .await
            .unwrap();
        people.push(member.id);
    }

    let mut recorded: Vec<Uuid> = Vec::new();
    for step in steps {
        let outcome = match step {
            Step::Create {
                amount,
                payer,
                participants,
                shares,
            } => {
                let participants: Vec<Uuid> = participants.iter().map(|i| people[*i]).collect();
                let payer = participants[payer % participants.len()];
                let policy = shares.map_or(SplitPolicy::Equal, SplitPolicy::Shares);
                engine
                    .create_expense(NewExpenseCmd::new(
                        group.id,
                        "Shopping",
                        MoneyCents::new(amount),
                        payer,
                        SplitRequest::new(policy, participants),
                    ))
                    .await
                    .map(|expense| recorded.push(expense.id))
            }
            Step::Update { pick, amount } if !recorded.is_empty() => engine
                .update_expense(
                    UpdateExpenseCmd::new(group.id, recorded[pick % recorded.len()])
                        .amount(MoneyCents::new(amount)),
                )
                .await
                .map(|_| ()),
            Step::Delete { pick } if !recorded.is_empty() => engine
                .delete_expense(group.id, recorded[pick % recorded.len()])
                .await
                .map(|_| ()),
            Step::Settle { from, to, amount } => engine
                .settle(SettleCmd::new(
                    group.id,
                    people[from],
                    people[to],
                    MoneyCents::new(amount),
                ))
                .await
                .map(|expense| recorded.push(expense.id)),
            Step::Update { .. } | Step::Delete { .. } => Ok(()),
        };
        if let Err(err) = outcome {
            prop_assert!(expected_rejection(&err), "unexpected failure: {err}");
        }

        let members = engine.group_balances(group.id).await.unwrap();
        prop_assert!(check_zero_sum(&members).is_ok());
        prop_assert!(engine.verify_group(group.id).await.is_ok());
    }

    // Reversing everything that is still active brings every balance back
    // to zero.
    for expense in engine.group_expenses(group.id, false).await.unwrap() {
        engine.delete_expense(group.id, expense.id).await.unwrap();
    }
    let members = engine.group_balances(group.id).await.unwrap();
    prop_assert!(members.iter().all(|m| m.balance.is_zero()));
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_histories_keep_the_group_balanced(steps in prop::collection::vec(step(), 1..25)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(replay(steps))?;
    }
}
