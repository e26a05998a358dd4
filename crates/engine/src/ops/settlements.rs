use uuid::Uuid;

use crate::{
    Activity, ActivityKind, EngineError, Expense, ExpenseCategory, ExpenseKind, ExpenseStatus,
    LedgerStore, MoneyCents, ResultEngine, SETTLEMENT_TITLE, SettleCmd, Split, SplitType,
    expense_deltas, util::normalize_optional_text,
};

use super::{Engine, expenses::ensure_members};

impl<S: LedgerStore> Engine<S> {
    /// Records a payment from `cmd.from` to `cmd.to`.
    ///
    /// The settlement is an `Exact` expense paid by `from` with a zero share,
    /// where `to` carries the whole amount: `from` moves up by `amount` and
    /// `to` moves down by the same.
    pub async fn settle(&self, cmd: SettleCmd) -> ResultEngine<Expense> {
        if !cmd.amount.is_positive() {
            return Err(EngineError::InvalidSettlement(
                "settlement amount must be > 0".to_string(),
            ));
        }
        if cmd.from == cmd.to {
            return Err(EngineError::InvalidSettlement(
                "cannot settle with yourself".to_string(),
            ));
        }

        let mut expense = Expense::new(
            cmd.group_id,
            SETTLEMENT_TITLE.to_string(),
            cmd.amount,
            cmd.date,
            cmd.from,
            SplitType::Exact,
            vec![
                Split::new(cmd.from, MoneyCents::ZERO, true),
                Split::new(cmd.to, cmd.amount, false),
            ],
        );
        expense.category = ExpenseCategory::Other;
        expense.kind = ExpenseKind::Settlement;
        expense.notes = normalize_optional_text(cmd.notes.as_deref());
        expense.validate()?;

        let _guard = self.lock_group_write(cmd.group_id).await?;
        self.require_group(cmd.group_id).await?;
        let members = self.store.load_group_members(cmd.group_id).await?;
        ensure_members(&members, [&cmd.from, &cmd.to])?;

        expense.status = ExpenseStatus::Active;
        expense.revision = 1;
        self.commit(&members, &expense, None, &expense_deltas(&expense))
            .await?;
        tracing::info!(
            "settlement {} of {} recorded in group {}",
            expense.id,
            expense.amount,
            expense.group_id
        );

        let name = |id: Uuid| {
            members
                .iter()
                .find(|m| m.id == id)
                .map_or_else(|| id.to_string(), |m| m.display_name.clone())
        };
        self.record(Activity::new(
            expense.group_id,
            ActivityKind::SettlementCreated,
            Some(expense.id),
            format!("{} paid {} {}", name(cmd.from), name(cmd.to), expense.amount),
        ))
        .await;
        Ok(expense)
    }

    pub async fn settle_between(
        &self,
        from: Uuid,
        to: Uuid,
        amount: MoneyCents,
        group_id: Uuid,
    ) -> ResultEngine<Expense> {
        self.settle(SettleCmd::new(group_id, from, to, amount)).await
    }
}
