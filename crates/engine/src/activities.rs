//! Group activity feed.
//!
//! Activities are informational: they describe committed operations and are
//! never read back by the ledger.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, util::parse_uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    GroupCreated,
    GroupUpdated,
    MemberAdded,
    MemberRemoved,
    ExpenseCreated,
    ExpenseUpdated,
    ExpenseDeleted,
    SettlementCreated,
}

impl ActivityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GroupCreated => "group_created",
            Self::GroupUpdated => "group_updated",
            Self::MemberAdded => "member_added",
            Self::MemberRemoved => "member_removed",
            Self::ExpenseCreated => "expense_created",
            Self::ExpenseUpdated => "expense_updated",
            Self::ExpenseDeleted => "expense_deleted",
            Self::SettlementCreated => "settlement_created",
        }
    }
}

impl TryFrom<&str> for ActivityKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "group_created" => Ok(Self::GroupCreated),
            "group_updated" => Ok(Self::GroupUpdated),
            "member_added" => Ok(Self::MemberAdded),
            "member_removed" => Ok(Self::MemberRemoved),
            "expense_created" => Ok(Self::ExpenseCreated),
            "expense_updated" => Ok(Self::ExpenseUpdated),
            "expense_deleted" => Ok(Self::ExpenseDeleted),
            "settlement_created" => Ok(Self::SettlementCreated),
            other => Err(EngineError::PersistenceFailure(format!(
                "invalid activity kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub group_id: Uuid,
    pub kind: ActivityKind,
    /// Expense or member the activity refers to.
    pub target_id: Option<Uuid>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    pub fn new(
        group_id: Uuid,
        kind: ActivityKind,
        target_id: Option<Uuid>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            group_id,
            kind,
            target_id,
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "activities")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub group_id: String,
    pub kind: String,
    pub target_id: Option<String>,
    pub message: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Activity> for ActiveModel {
    fn from(activity: &Activity) -> Self {
        Self {
            id: ActiveValue::Set(activity.id.to_string()),
            group_id: ActiveValue::Set(activity.group_id.to_string()),
            kind: ActiveValue::Set(activity.kind.as_str().to_string()),
            target_id: ActiveValue::Set(activity.target_id.map(|id| id.to_string())),
            message: ActiveValue::Set(activity.message.clone()),
            created_at: ActiveValue::Set(activity.created_at),
        }
    }
}

impl TryFrom<Model> for Activity {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "activity")?,
            group_id: parse_uuid(&model.group_id, "group")?,
            kind: ActivityKind::try_from(model.kind.as_str())?,
            target_id: model
                .target_id
                .as_deref()
                .map(|raw| parse_uuid(raw, "activity target"))
                .transpose()?,
            message: model.message,
            created_at: model.created_at,
        })
    }
}
