//! Expense splits.
//!
//! A [`Split`] is one participant's share of an [`Expense`](crate::Expense).
//! Splits are stored in participant order; the `position` column keeps that
//! order stable across reloads.
//!
//! Amounts are stored as integer **cents**. For every recorded expense the
//! split amounts add up to the expense amount exactly.

use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents, util::parse_uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub member_id: Uuid,
    pub amount: MoneyCents,
    pub is_payer: bool,
}

impl Split {
    pub fn new(member_id: Uuid, amount: MoneyCents, is_payer: bool) -> Self {
        Self {
            member_id,
            amount,
            is_payer,
        }
    }
}

/// Sum of all split amounts.
#[must_use]
pub fn splits_total(splits: &[Split]) -> MoneyCents {
    splits.iter().map(|s| s.amount).sum()
}

/// Returns `true` when the splits add up to `amount` to the cent.
#[must_use]
pub fn reconciles(amount: MoneyCents, splits: &[Split]) -> bool {
    splits_total(splits) == amount
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "expense_splits")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub expense_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub position: i32,
    pub member_id: String,
    pub amount_minor: i64,
    pub is_payer: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::expenses::Entity",
        from = "Column::ExpenseId",
        to = "super::expenses::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Expenses,
}

impl Related<super::expenses::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Expenses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub(crate) fn from_split(expense_id: Uuid, position: usize, split: &Split) -> Self {
        Self {
            expense_id: ActiveValue::Set(expense_id.to_string()),
            position: ActiveValue::Set(position as i32),
            member_id: ActiveValue::Set(split.member_id.to_string()),
            amount_minor: ActiveValue::Set(split.amount.cents()),
            is_payer: ActiveValue::Set(split.is_payer),
        }
    }
}

impl TryFrom<Model> for Split {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            member_id: parse_uuid(&model.member_id, "member")?,
            amount: MoneyCents::new(model.amount_minor),
            is_payer: model.is_payer,
        })
    }
}
