use uuid::Uuid;

use crate::{Activity, LedgerStore, ResultEngine};

use super::Engine;

impl<S: LedgerStore> Engine<S> {
    /// Most recent activity of a group, newest first.
    pub async fn group_activity(&self, group_id: Uuid, limit: u64) -> ResultEngine<Vec<Activity>> {
        self.require_group(group_id).await?;
        self.store.list_activity(group_id, limit).await
    }
}
