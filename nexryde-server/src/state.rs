use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use log::debug;
use tokio::sync::broadcast;
use uuid::Uuid;

use nexryde_logic::{FeedEvent, PositionRecord};

type StateObj<T> = Arc<Mutex<T>>;

/// Scope a record lives in: None is the global table, Some is per-trip
pub type ScopeKey = Option<Uuid>;

/// One row per (scope, actor). Upserts replace in place so duplicate rows
/// cannot accumulate.
type Table = HashMap<(ScopeKey, Uuid), PositionRecord>;

const FEED_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct ServerState {
    table: StateObj<Table>,
    feed: broadcast::Sender<(ScopeKey, FeedEvent)>,
}

impl Default for ServerState {
    fn default() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            table: StateObj::default(),
            feed,
        }
    }
}

impl ServerState {
    pub fn upsert(&self, record: PositionRecord) {
        let scope = record.trip_id;
        let replaced = self
            .table
            .lock()
            .unwrap()
            .insert((scope, record.user_id), record.clone());
        debug!(
            "{} position for {}",
            if replaced.is_some() { "Updated" } else { "Inserted" },
            record.user_id
        );
        self.feed.send((scope, FeedEvent::Upsert { record })).ok();
    }

    pub fn list(&self, scope: ScopeKey) -> Vec<PositionRecord> {
        self.table
            .lock()
            .unwrap()
            .iter()
            .filter(|((s, _), _)| *s == scope)
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Remove an actor's record, returns whether one existed
    pub fn delete(&self, scope: ScopeKey, user_id: Uuid) -> bool {
        let removed = self
            .table
            .lock()
            .unwrap()
            .remove(&(scope, user_id))
            .is_some();
        if removed {
            debug!("Deleted position for {user_id}");
            self.feed.send((scope, FeedEvent::Delete { user_id })).ok();
        }
        removed
    }

    pub fn subscribe(&self) -> broadcast::Receiver<(ScopeKey, FeedEvent)> {
        self.feed.subscribe()
    }
}
