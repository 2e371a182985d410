use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    prelude::*,
    record::{PositionRecord, TrackingScope},
};

#[derive(Debug, Clone)]
/// An incremental change delivered by the store's notification channel. The
/// channel offers no ordering or delivery guarantee, the periodic re-fetch
/// is the correction mechanism.
pub enum StoreChange {
    /// A record was inserted or updated
    Upsert(PositionRecord),
    /// The record for the given actor was removed
    Delete(Uuid),
    /// The feed was closed deliberately, consumers should stop
    Disconnected,
    /// The feed failed, consumers should fall back to polling
    Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
/// Wire form of one change notification on the feed channel
pub enum FeedEvent {
    Upsert { record: PositionRecord },
    Delete { user_id: Uuid },
}

impl From<FeedEvent> for StoreChange {
    fn from(v: FeedEvent) -> Self {
        match v {
            FeedEvent::Upsert { record } => StoreChange::Upsert(record),
            FeedEvent::Delete { user_id } => StoreChange::Delete(user_id),
        }
    }
}

/// Seam to the shared position table. Writes are self-scoped, an
/// implementation only ever writes the record of the actor it was opened
/// for; reads see every record in the scope.
pub trait LocationStore: Send + Sync {
    /// The actor this store connection writes as
    fn self_id(&self) -> Uuid;
    /// Write the actor's current record, overwriting any previous one
    fn upsert(&self, record: &PositionRecord) -> impl Future<Output = Result> + Send;
    /// Fetch every record in the given scope
    fn fetch_all(
        &self,
        scope: &TrackingScope,
    ) -> impl Future<Output = Result<Vec<PositionRecord>>> + Send;
    /// Remove the actor's own record so other clients stop seeing it
    fn delete_own(&self) -> impl Future<Output = Result> + Send;
    /// Receive a batch of pushed changes, waiting until at least one arrives
    fn receive_changes(&self) -> impl Future<Output = impl Iterator<Item = StoreChange>>;
    /// Tear down the change feed
    fn disconnect(&self) -> impl Future<Output = ()> {
        async {}
    }
}
