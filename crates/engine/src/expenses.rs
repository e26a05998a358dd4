//! Expense primitives.
//!
//! An [`Expense`] is the only source of balance changes in a group. Its
//! [`Split`]s say how the amount is shared; the payer fronted the whole
//! amount.
//!
//! Lifecycle: `Pending` while being built, `Active` once its deltas are in the
//! ledger, `Reversed` after delete. `Reversed` is terminal.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, MoneyCents, ResultEngine, Split, SplitType, splits::splits_total,
    util::parse_uuid,
};

use super::splits;

pub const SETTLEMENT_TITLE: &str = "Settlement payment";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseCategory {
    Food,
    Rent,
    Utilities,
    Entertainment,
    Transportation,
    Shopping,
    Travel,
    Health,
    #[default]
    Other,
}

impl ExpenseCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Food => "food",
            Self::Rent => "rent",
            Self::Utilities => "utilities",
            Self::Entertainment => "entertainment",
            Self::Transportation => "transportation",
            Self::Shopping => "shopping",
            Self::Travel => "travel",
            Self::Health => "health",
            Self::Other => "other",
        }
    }
}

impl TryFrom<&str> for ExpenseCategory {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "food" => Ok(Self::Food),
            "rent" => Ok(Self::Rent),
            "utilities" => Ok(Self::Utilities),
            "entertainment" => Ok(Self::Entertainment),
            "transportation" => Ok(Self::Transportation),
            "shopping" => Ok(Self::Shopping),
            "travel" => Ok(Self::Travel),
            "health" => Ok(Self::Health),
            "other" => Ok(Self::Other),
            other => Err(EngineError::InvalidExpense(format!(
                "invalid expense category: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseKind {
    #[default]
    Regular,
    Settlement,
}

impl ExpenseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Settlement => "settlement",
        }
    }
}

impl TryFrom<&str> for ExpenseKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "regular" => Ok(Self::Regular),
            "settlement" => Ok(Self::Settlement),
            other => Err(EngineError::PersistenceFailure(format!(
                "invalid expense kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    Pending,
    Active,
    Reversed,
}

impl ExpenseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Reversed => "reversed",
        }
    }
}

impl TryFrom<&str> for ExpenseStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "reversed" => Ok(Self::Reversed),
            other => Err(EngineError::PersistenceFailure(format!(
                "invalid expense status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub group_id: Uuid,
    pub title: String,
    pub amount: MoneyCents,
    pub category: ExpenseCategory,
    pub date: DateTime<Utc>,
    pub paid_by: Uuid,
    pub split_type: SplitType,
    pub splits: Vec<Split>,
    pub notes: Option<String>,
    pub kind: ExpenseKind,
    pub status: ExpenseStatus,
    /// Bumped on every stored change; used for optimistic concurrency.
    pub revision: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    /// Creates a `Pending` expense. Call [`Expense::validate`] before handing
    /// it to the ledger.
    pub fn new(
        group_id: Uuid,
        title: String,
        amount: MoneyCents,
        date: DateTime<Utc>,
        paid_by: Uuid,
        split_type: SplitType,
        splits: Vec<Split>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            group_id,
            title,
            amount,
            category: ExpenseCategory::default(),
            date,
            paid_by,
            split_type,
            splits,
            notes: None,
            kind: ExpenseKind::Regular,
            status: ExpenseStatus::Pending,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ExpenseStatus::Active
    }

    /// Checks the invariants the ledger relies on:
    ///
    /// - `amount > 0`
    /// - at least one split, no member twice, no negative share
    /// - exactly the payer's split is flagged `is_payer`, and the payer has a
    ///   split
    /// - split amounts add up to `amount` to the cent
    pub fn validate(&self) -> ResultEngine<()> {
        if !self.amount.is_positive() {
            return Err(EngineError::InvalidSplitParams(
                "amount must be > 0".to_string(),
            ));
        }
        if self.splits.is_empty() {
            return Err(EngineError::InvalidSplitParams(
                "expense has no splits".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::with_capacity(self.splits.len());
        let mut payer_seen = false;
        for split in &self.splits {
            if !seen.insert(split.member_id) {
                return Err(EngineError::InvalidSplitParams(format!(
                    "member {} appears twice in splits",
                    split.member_id
                )));
            }
            if split.amount.is_negative() {
                return Err(EngineError::InvalidSplitParams(format!(
                    "negative share for member {}",
                    split.member_id
                )));
            }
            if split.is_payer != (split.member_id == self.paid_by) {
                return Err(EngineError::InvalidSplitParams(format!(
                    "payer flag mismatch for member {}",
                    split.member_id
                )));
            }
            payer_seen |= split.is_payer;
        }
        if !payer_seen {
            return Err(EngineError::InvalidSplitParams(
                "payer must be one of the participants".to_string(),
            ));
        }

        let total = splits_total(&self.splits);
        if total != self.amount {
            return Err(EngineError::InvalidSplitParams(format!(
                "splits add up to {total}, expected {}",
                self.amount
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "expenses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub group_id: String,
    pub title: String,
    pub amount_minor: i64,
    pub category: String,
    pub occurred_at: DateTimeUtc,
    pub paid_by: String,
    pub split_type: String,
    pub notes: Option<String>,
    pub kind: String,
    pub status: String,
    pub revision: i64,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::splits::Entity")]
    Splits,
    #[sea_orm(
        belongs_to = "super::groups::Entity",
        from = "Column::GroupId",
        to = "super::groups::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Groups,
}

impl Related<super::splits::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Splits.def()
    }
}

impl Related<super::groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Groups.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Expense> for ActiveModel {
    fn from(expense: &Expense) -> Self {
        Self {
            id: ActiveValue::Set(expense.id.to_string()),
            group_id: ActiveValue::Set(expense.group_id.to_string()),
            title: ActiveValue::Set(expense.title.clone()),
            amount_minor: ActiveValue::Set(expense.amount.cents()),
            category: ActiveValue::Set(expense.category.as_str().to_string()),
            occurred_at: ActiveValue::Set(expense.date),
            paid_by: ActiveValue::Set(expense.paid_by.to_string()),
            split_type: ActiveValue::Set(expense.split_type.as_str().to_string()),
            notes: ActiveValue::Set(expense.notes.clone()),
            kind: ActiveValue::Set(expense.kind.as_str().to_string()),
            status: ActiveValue::Set(expense.status.as_str().to_string()),
            revision: ActiveValue::Set(i64::from(expense.revision)),
            created_at: ActiveValue::Set(expense.created_at),
            updated_at: ActiveValue::Set(expense.updated_at),
        }
    }
}

impl TryFrom<(Model, Vec<splits::Model>)> for Expense {
    type Error = EngineError;

    fn try_from((model, mut split_models): (Model, Vec<splits::Model>)) -> Result<Self, Self::Error> {
        split_models.sort_by_key(|s| s.position);
        let splits = split_models
            .into_iter()
            .map(Split::try_from)
            .collect::<ResultEngine<Vec<_>>>()?;

        Ok(Self {
            id: parse_uuid(&model.id, "expense")?,
            group_id: parse_uuid(&model.group_id, "group")?,
            title: model.title,
            amount: MoneyCents::new(model.amount_minor),
            category: ExpenseCategory::try_from(model.category.as_str())?,
            date: model.occurred_at,
            paid_by: parse_uuid(&model.paid_by, "member")?,
            split_type: SplitType::try_from(model.split_type.as_str())?,
            splits,
            notes: model.notes,
            kind: ExpenseKind::try_from(model.kind.as_str())?,
            status: ExpenseStatus::try_from(model.status.as_str())?,
            revision: u32::try_from(model.revision).map_err(|_| {
                EngineError::PersistenceFailure(format!("invalid expense revision: {}", model.revision))
            })?,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expense_with(amount: i64, payer: Uuid, splits: Vec<Split>) -> Expense {
        Expense::new(
            Uuid::new_v4(),
            "Dinner".to_string(),
            MoneyCents::new(amount),
            Utc::now(),
            payer,
            SplitType::Exact,
            splits,
        )
    }

    #[test]
    fn validate_accepts_reconciled_splits() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let expense = expense_with(
            1000,
            a,
            vec![
                Split::new(a, MoneyCents::new(500), true),
                Split::new(b, MoneyCents::new(500), false),
            ],
        );
        assert!(expense.validate().is_ok());
        assert_eq!(expense.status, ExpenseStatus::Pending);
    }

    #[test]
    fn validate_rejects_drifting_splits() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let expense = expense_with(
            1000,
            a,
            vec![
                Split::new(a, MoneyCents::new(500), true),
                Split::new(b, MoneyCents::new(499), false),
            ],
        );
        assert!(matches!(
            expense.validate(),
            Err(EngineError::InvalidSplitParams(_))
        ));
    }

    #[test]
    fn validate_rejects_wrong_payer_flags() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let expense = expense_with(
            1000,
            a,
            vec![
                Split::new(a, MoneyCents::new(500), false),
                Split::new(b, MoneyCents::new(500), true),
            ],
        );
        assert!(expense.validate().is_err());

        let outsider = Uuid::new_v4();
        let expense = expense_with(1000, outsider, vec![Split::new(a, MoneyCents::new(1000), false)]);
        assert!(expense.validate().is_err());
    }

    #[test]
    fn category_round_trips_through_its_code() {
        for category in [ExpenseCategory::Food, ExpenseCategory::Travel, ExpenseCategory::Other] {
            assert_eq!(ExpenseCategory::try_from(category.as_str()).unwrap(), category);
        }
        assert!(ExpenseCategory::try_from("groceries").is_err());
    }
}
