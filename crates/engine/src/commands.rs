//! Command structs for engine operations.
//!
//! These types group parameters for write operations
//! (group/member/expense/settlement), keeping call sites readable and avoiding
//! long argument lists.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{ExpenseCategory, MoneyCents, SplitPolicy};

/// Create a group.
#[derive(Clone, Debug)]
pub struct NewGroupCmd {
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
}

impl NewGroupCmd {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: None,
            description: None,
        }
    }

    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Edit a group. `None` keeps the stored value.
#[derive(Clone, Debug)]
pub struct UpdateGroupCmd {
    pub group_id: Uuid,
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
}

impl UpdateGroupCmd {
    #[must_use]
    pub fn new(group_id: Uuid) -> Self {
        Self {
            group_id,
            name: None,
            category: None,
            description: None,
        }
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// An empty string clears the category.
    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// An empty string clears the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Add a user to a group.
#[derive(Clone, Debug)]
pub struct AddMemberCmd {
    pub group_id: Uuid,
    pub user_id: String,
    pub display_name: String,
}

impl AddMemberCmd {
    #[must_use]
    pub fn new(
        group_id: Uuid,
        user_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            group_id,
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// How an amount is shared: the policy and the ordered participant list its
/// parameters refer to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitRequest {
    pub policy: SplitPolicy,
    pub participants: Vec<Uuid>,
}

impl SplitRequest {
    #[must_use]
    pub fn new(policy: SplitPolicy, participants: Vec<Uuid>) -> Self {
        Self {
            policy,
            participants,
        }
    }

    #[must_use]
    pub fn equal(participants: Vec<Uuid>) -> Self {
        Self::new(SplitPolicy::Equal, participants)
    }
}

/// Create an expense.
#[derive(Clone, Debug)]
pub struct NewExpenseCmd {
    pub group_id: Uuid,
    pub title: String,
    pub amount: MoneyCents,
    pub paid_by: Uuid,
    pub split: SplitRequest,
    pub category: ExpenseCategory,
    pub date: DateTime<Utc>,
    pub notes: Option<String>,
}

impl NewExpenseCmd {
    #[must_use]
    pub fn new(
        group_id: Uuid,
        title: impl Into<String>,
        amount: MoneyCents,
        paid_by: Uuid,
        split: SplitRequest,
    ) -> Self {
        Self {
            group_id,
            title: title.into(),
            amount,
            paid_by,
            split,
            category: ExpenseCategory::default(),
            date: Utc::now(),
            notes: None,
        }
    }

    #[must_use]
    pub fn category(mut self, category: ExpenseCategory) -> Self {
        self.category = category;
        self
    }

    #[must_use]
    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    #[must_use]
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Update an existing expense.
///
/// Only fields set on the command change; `None` keeps the stored value.
/// Changing the amount of a non-`Equal` expense requires a new split.
#[derive(Clone, Debug)]
pub struct UpdateExpenseCmd {
    pub group_id: Uuid,
    pub expense_id: Uuid,
    /// Revision the caller last saw; `None` skips the check.
    pub expected_revision: Option<u32>,
    pub title: Option<String>,
    pub amount: Option<MoneyCents>,
    pub paid_by: Option<Uuid>,
    pub split: Option<SplitRequest>,
    pub category: Option<ExpenseCategory>,
    pub date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub clear_notes: bool,
}

impl UpdateExpenseCmd {
    #[must_use]
    pub fn new(group_id: Uuid, expense_id: Uuid) -> Self {
        Self {
            group_id,
            expense_id,
            expected_revision: None,
            title: None,
            amount: None,
            paid_by: None,
            split: None,
            category: None,
            date: None,
            notes: None,
            clear_notes: false,
        }
    }

    #[must_use]
    pub fn expected_revision(mut self, revision: u32) -> Self {
        self.expected_revision = Some(revision);
        self
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn amount(mut self, amount: MoneyCents) -> Self {
        self.amount = Some(amount);
        self
    }

    #[must_use]
    pub fn paid_by(mut self, member_id: Uuid) -> Self {
        self.paid_by = Some(member_id);
        self
    }

    #[must_use]
    pub fn split(mut self, split: SplitRequest) -> Self {
        self.split = Some(split);
        self
    }

    #[must_use]
    pub fn category(mut self, category: ExpenseCategory) -> Self {
        self.category = Some(category);
        self
    }

    #[must_use]
    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    #[must_use]
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    #[must_use]
    pub fn clear_notes(mut self) -> Self {
        self.clear_notes = true;
        self
    }
}

/// Record a payment from `from` to `to`.
#[derive(Clone, Debug)]
pub struct SettleCmd {
    pub group_id: Uuid,
    pub from: Uuid,
    pub to: Uuid,
    pub amount: MoneyCents,
    pub date: DateTime<Utc>,
    pub notes: Option<String>,
}

impl SettleCmd {
    #[must_use]
    pub fn new(group_id: Uuid, from: Uuid, to: Uuid, amount: MoneyCents) -> Self {
        Self {
            group_id,
            from,
            to,
            amount,
            date: Utc::now(),
            notes: None,
        }
    }

    #[must_use]
    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    #[must_use]
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}
