use std::collections::HashMap;

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    ModelTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    Activity, BalanceChange, EngineError, Expense, Group, Member, MoneyCents, ResultEngine,
    activities, expenses, groups, members, splits,
};

use super::{LedgerStore, revision_conflict};

/// Run a block inside a DB transaction, committing on success. Returning
/// early (or with `Err`) drops the transaction, which rolls it back.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result: ResultEngine<_> = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

/// [`LedgerStore`] backed by `sea-orm`.
#[derive(Clone, Debug)]
pub struct SqlStore {
    database: DatabaseConnection,
}

impl SqlStore {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }

    pub fn database(&self) -> &DatabaseConnection {
        &self.database
    }
}

async fn write_balance<C: ConnectionTrait>(
    conn: &C,
    group_id: Uuid,
    member_id: Uuid,
    balance: MoneyCents,
) -> ResultEngine<()> {
    let res = members::Entity::update_many()
        .col_expr(members::Column::BalanceMinor, Expr::value(balance.cents()))
        .filter(members::Column::Id.eq(member_id.to_string()))
        .filter(members::Column::GroupId.eq(group_id.to_string()))
        .exec(conn)
        .await?;
    if res.rows_affected == 0 {
        return Err(EngineError::MemberNotFound(member_id.to_string()));
    }
    Ok(())
}

/// Inserts or replaces the expense row and its splits after checking the
/// stored revision.
async fn write_expense<C: ConnectionTrait>(
    conn: &C,
    expense: &Expense,
    expected_revision: Option<u32>,
) -> ResultEngine<()> {
    let stored = expenses::Entity::find_by_id(expense.id.to_string())
        .one(conn)
        .await?;
    let stored_revision = stored
        .as_ref()
        .map(|m| u32::try_from(m.revision).unwrap_or(u32::MAX));
    if stored_revision != expected_revision {
        return Err(revision_conflict(
            expense.id,
            expected_revision,
            stored_revision,
        ));
    }

    let model = expenses::ActiveModel::from(expense);
    if stored.is_some() {
        model.update(conn).await?;
        splits::Entity::delete_many()
            .filter(splits::Column::ExpenseId.eq(expense.id.to_string()))
            .exec(conn)
            .await?;
    } else {
        model.insert(conn).await?;
    }

    if !expense.splits.is_empty() {
        let split_models = expense
            .splits
            .iter()
            .enumerate()
            .map(|(position, split)| splits::ActiveModel::from_split(expense.id, position, split));
        splits::Entity::insert_many(split_models).exec(conn).await?;
    }
    Ok(())
}

#[async_trait]
impl LedgerStore for SqlStore {
    async fn insert_group(&self, group: &Group) -> ResultEngine<()> {
        groups::ActiveModel::from(group)
            .insert(&self.database)
            .await?;
        Ok(())
    }

    async fn load_group(&self, group_id: Uuid) -> ResultEngine<Option<Group>> {
        groups::Entity::find_by_id(group_id.to_string())
            .one(&self.database)
            .await?
            .map(Group::try_from)
            .transpose()
    }

    async fn update_group(&self, group: &Group) -> ResultEngine<()> {
        let res = groups::Entity::update_many()
            .col_expr(groups::Column::Name, Expr::value(group.name.clone()))
            .col_expr(groups::Column::Category, Expr::value(group.category.clone()))
            .col_expr(
                groups::Column::Description,
                Expr::value(group.description.clone()),
            )
            .col_expr(groups::Column::UpdatedAt, Expr::value(group.updated_at))
            .filter(groups::Column::Id.eq(group.id.to_string()))
            .exec(&self.database)
            .await?;
        if res.rows_affected == 0 {
            return Err(EngineError::GroupNotFound(group.id.to_string()));
        }
        Ok(())
    }

    async fn delete_group(&self, group_id: Uuid) -> ResultEngine<()> {
        let group_id = group_id.to_string();
        with_tx!(self, |tx| {
            let expense_ids: Vec<String> = expenses::Entity::find()
                .select_only()
                .column(expenses::Column::Id)
                .filter(expenses::Column::GroupId.eq(group_id.as_str()))
                .into_tuple()
                .all(&tx)
                .await?;
            if !expense_ids.is_empty() {
                splits::Entity::delete_many()
                    .filter(splits::Column::ExpenseId.is_in(expense_ids))
                    .exec(&tx)
                    .await?;
            }
            expenses::Entity::delete_many()
                .filter(expenses::Column::GroupId.eq(group_id.as_str()))
                .exec(&tx)
                .await?;
            activities::Entity::delete_many()
                .filter(activities::Column::GroupId.eq(group_id.as_str()))
                .exec(&tx)
                .await?;
            members::Entity::delete_many()
                .filter(members::Column::GroupId.eq(group_id.as_str()))
                .exec(&tx)
                .await?;
            let res = groups::Entity::delete_by_id(group_id.clone())
                .exec(&tx)
                .await?;
            if res.rows_affected == 0 {
                return Err(EngineError::GroupNotFound(group_id));
            }
            Ok(())
        })
    }

    async fn insert_member(&self, member: &Member) -> ResultEngine<()> {
        members::ActiveModel::from(member)
            .insert(&self.database)
            .await?;
        Ok(())
    }

    async fn remove_member(&self, group_id: Uuid, member_id: Uuid) -> ResultEngine<()> {
        let res = members::Entity::delete_many()
            .filter(members::Column::Id.eq(member_id.to_string()))
            .filter(members::Column::GroupId.eq(group_id.to_string()))
            .exec(&self.database)
            .await?;
        if res.rows_affected == 0 {
            return Err(EngineError::MemberNotFound(member_id.to_string()));
        }
        Ok(())
    }

    async fn load_group_members(&self, group_id: Uuid) -> ResultEngine<Vec<Member>> {
        members::Entity::find()
            .filter(members::Column::GroupId.eq(group_id.to_string()))
            .order_by_asc(members::Column::DisplayName)
            .order_by_asc(members::Column::Id)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Member::try_from)
            .collect()
    }

    async fn load_user_memberships(&self, user_id: &str) -> ResultEngine<Vec<Member>> {
        members::Entity::find()
            .filter(members::Column::UserId.eq(user_id))
            .order_by_asc(members::Column::GroupId)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Member::try_from)
            .collect()
    }

    async fn save_member_balance(
        &self,
        group_id: Uuid,
        member_id: Uuid,
        balance: MoneyCents,
    ) -> ResultEngine<()> {
        write_balance(&self.database, group_id, member_id, balance).await
    }

    async fn load_expense(&self, expense_id: Uuid) -> ResultEngine<Option<Expense>> {
        let Some(model) = expenses::Entity::find_by_id(expense_id.to_string())
            .one(&self.database)
            .await?
        else {
            return Ok(None);
        };
        let split_models = model.find_related(splits::Entity).all(&self.database).await?;
        Expense::try_from((model, split_models)).map(Some)
    }

    async fn save_expense(
        &self,
        expense: &Expense,
        expected_revision: Option<u32>,
    ) -> ResultEngine<()> {
        with_tx!(self, |tx| write_expense(&tx, expense, expected_revision).await)
    }

    /// One DB transaction: a failed balance write rolls back the expense
    /// row too, so nothing has to be compensated.
    async fn commit_expense(
        &self,
        expense: &Expense,
        previous: Option<&Expense>,
        changes: &[BalanceChange],
    ) -> ResultEngine<()> {
        with_tx!(self, |tx| {
            write_expense(&tx, expense, previous.map(|p| p.revision)).await?;
            for change in changes {
                write_balance(&tx, expense.group_id, change.member_id, change.new).await?;
            }
            Ok(())
        })
    }

    async fn delete_expense(&self, expense_id: Uuid) -> ResultEngine<()> {
        let expense_id = expense_id.to_string();
        with_tx!(self, |tx| {
            splits::Entity::delete_many()
                .filter(splits::Column::ExpenseId.eq(expense_id.as_str()))
                .exec(&tx)
                .await?;
            let res = expenses::Entity::delete_by_id(expense_id.clone())
                .exec(&tx)
                .await?;
            if res.rows_affected == 0 {
                return Err(EngineError::ExpenseNotFound(expense_id));
            }
            Ok(())
        })
    }

    async fn list_group_expenses(&self, group_id: Uuid) -> ResultEngine<Vec<Expense>> {
        let expense_models = expenses::Entity::find()
            .filter(expenses::Column::GroupId.eq(group_id.to_string()))
            .order_by_desc(expenses::Column::OccurredAt)
            .order_by_desc(expenses::Column::CreatedAt)
            .all(&self.database)
            .await?;
        if expense_models.is_empty() {
            return Ok(Vec::new());
        }

        let mut splits_by_expense: HashMap<String, Vec<splits::Model>> = HashMap::new();
        for split in splits::Entity::find()
            .filter(
                splits::Column::ExpenseId.is_in(expense_models.iter().map(|m| m.id.clone())),
            )
            .all(&self.database)
            .await?
        {
            splits_by_expense
                .entry(split.expense_id.clone())
                .or_default()
                .push(split);
        }

        expense_models
            .into_iter()
            .map(|model| {
                let split_models = splits_by_expense.remove(&model.id).unwrap_or_default();
                Expense::try_from((model, split_models))
            })
            .collect()
    }

    async fn record_activity(&self, activity: &Activity) -> ResultEngine<()> {
        activities::ActiveModel::from(activity)
            .insert(&self.database)
            .await?;
        Ok(())
    }

    async fn list_activity(&self, group_id: Uuid, limit: u64) -> ResultEngine<Vec<Activity>> {
        activities::Entity::find()
            .filter(activities::Column::GroupId.eq(group_id.to_string()))
            .order_by_desc(activities::Column::CreatedAt)
            .limit(limit)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Activity::try_from)
            .collect()
    }
}
