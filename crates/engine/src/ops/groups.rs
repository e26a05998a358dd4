use uuid::Uuid;

use crate::{
    Activity, ActivityKind, AddMemberCmd, EngineError, Group, LedgerStore, Member, NewGroupCmd,
    ResultEngine, UpdateGroupCmd,
    util::{normalize_optional_text, normalize_required_name},
};

use super::Engine;

impl<S: LedgerStore> Engine<S> {
    pub async fn create_group(&self, cmd: NewGroupCmd) -> ResultEngine<Group> {
        let name = normalize_required_name(&cmd.name, "group name")?;
        let group = Group::new(
            name,
            normalize_optional_text(cmd.category.as_deref()),
            normalize_optional_text(cmd.description.as_deref()),
        );
        self.store.insert_group(&group).await?;
        tracing::info!("group {} created", group.id);

        self.record(Activity::new(
            group.id,
            ActivityKind::GroupCreated,
            None,
            format!("Group \"{}\" created", group.name),
        ))
        .await;
        Ok(group)
    }

    pub async fn group(&self, group_id: Uuid) -> ResultEngine<Group> {
        self.require_group(group_id).await
    }

    /// Edits the group's name, category or description.
    ///
    /// A category or description that normalizes to nothing is cleared.
    pub async fn update_group(&self, cmd: UpdateGroupCmd) -> ResultEngine<Group> {
        let name = cmd
            .name
            .as_deref()
            .map(|name| normalize_required_name(name, "group name"))
            .transpose()?;

        let _guard = self.lock_group_write(cmd.group_id).await?;
        let mut group = self.require_group(cmd.group_id).await?;
        if let Some(name) = name {
            group.name = name;
        }
        if let Some(category) = cmd.category.as_deref() {
            group.category = normalize_optional_text(Some(category));
        }
        if let Some(description) = cmd.description.as_deref() {
            group.description = normalize_optional_text(Some(description));
        }
        group.touch();

        self.store.update_group(&group).await?;
        tracing::info!("group {} updated", group.id);

        self.record(Activity::new(
            group.id,
            ActivityKind::GroupUpdated,
            None,
            format!("Group \"{}\" updated", group.name),
        ))
        .await;
        Ok(group)
    }

    /// Deletes a group once every member is settled up.
    pub async fn delete_group(&self, group_id: Uuid) -> ResultEngine<()> {
        let _guard = self.lock_group_write(group_id).await?;
        self.require_group(group_id).await?;

        let members = self.store.load_group_members(group_id).await?;
        if let Some(member) = members.iter().find(|m| !m.balance.is_zero()) {
            return Err(EngineError::NonZeroBalanceOnRemoval(format!(
                "{} still has a balance of {}",
                member.display_name, member.balance
            )));
        }

        self.store.delete_group(group_id).await?;
        self.forget_group_lock(group_id).await;
        tracing::info!("group {group_id} deleted");
        Ok(())
    }

    pub async fn add_member(&self, cmd: AddMemberCmd) -> ResultEngine<Member> {
        let user_id = normalize_required_name(&cmd.user_id, "user id")?;
        let display_name = normalize_required_name(&cmd.display_name, "display name")?;

        let _guard = self.lock_group_write(cmd.group_id).await?;
        self.require_group(cmd.group_id).await?;

        let members = self.store.load_group_members(cmd.group_id).await?;
        if members.iter().any(|m| m.user_id == user_id) {
            return Err(EngineError::InvalidName(format!(
                "user {user_id} is already a member of this group"
            )));
        }

        let member = Member::new(cmd.group_id, user_id, display_name);
        self.store.insert_member(&member).await?;
        tracing::info!("member {} added to group {}", member.id, member.group_id);

        self.record(Activity::new(
            member.group_id,
            ActivityKind::MemberAdded,
            Some(member.id),
            format!("{} joined the group", member.display_name),
        ))
        .await;
        Ok(member)
    }

    /// Removes a member whose balance is zero.
    ///
    /// Expenses that mention the member are kept; they no longer contribute
    /// anything to a settled-up member.
    pub async fn remove_member(&self, group_id: Uuid, member_id: Uuid) -> ResultEngine<()> {
        let _guard = self.lock_group_write(group_id).await?;
        self.require_group(group_id).await?;

        let members = self.store.load_group_members(group_id).await?;
        let member = members
            .iter()
            .find(|m| m.id == member_id)
            .ok_or_else(|| EngineError::MemberNotFound(member_id.to_string()))?;
        if !member.balance.is_zero() {
            tracing::warn!(
                "refusing to remove member {member_id} with balance {}",
                member.balance
            );
            return Err(EngineError::NonZeroBalanceOnRemoval(format!(
                "{} has a balance of {}",
                member.display_name, member.balance
            )));
        }

        self.store.remove_member(group_id, member_id).await?;
        tracing::info!("member {member_id} removed from group {group_id}");

        self.record(Activity::new(
            group_id,
            ActivityKind::MemberRemoved,
            Some(member_id),
            format!("{} left the group", member.display_name),
        ))
        .await;
        Ok(())
    }

    pub async fn members(&self, group_id: Uuid) -> ResultEngine<Vec<Member>> {
        let _guard = self.lock_group_read(group_id).await?;
        self.require_group(group_id).await?;
        self.store.load_group_members(group_id).await
    }
}
