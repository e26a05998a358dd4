//! Group members and their running balances.
//!
//! `balance > 0` means the group owes the member, `balance < 0` means the
//! member owes the group. Balances are only ever changed by the ledger.

use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents, util::parse_uuid};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: String,
    pub display_name: String,
    pub balance: MoneyCents,
}

impl Member {
    pub fn new(group_id: Uuid, user_id: String, display_name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            group_id,
            user_id,
            display_name,
            balance: MoneyCents::ZERO,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "members")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub group_id: String,
    pub user_id: String,
    pub display_name: String,
    pub balance_minor: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::groups::Entity",
        from = "Column::GroupId",
        to = "super::groups::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Groups,
}

impl Related<super::groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Groups.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Member> for ActiveModel {
    fn from(member: &Member) -> Self {
        Self {
            id: ActiveValue::Set(member.id.to_string()),
            group_id: ActiveValue::Set(member.group_id.to_string()),
            user_id: ActiveValue::Set(member.user_id.clone()),
            display_name: ActiveValue::Set(member.display_name.clone()),
            balance_minor: ActiveValue::Set(member.balance.cents()),
        }
    }
}

impl TryFrom<Model> for Member {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "member")?,
            group_id: parse_uuid(&model.group_id, "group")?,
            user_id: model.user_id,
            display_name: model.display_name,
            balance: MoneyCents::new(model.balance_minor),
        })
    }
}
