use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    record::{PositionRecord, Role},
    store::StoreChange,
};

#[derive(Debug, Clone, Serialize)]
/// All currently-fresh position records visible to a client, keyed by actor.
/// Both triggers of the reconciliation loop feed it: the periodic full fetch
/// replaces the whole map, pushed changes patch it in place.
pub struct LivePositionSet {
    records: HashMap<Uuid, PositionRecord>,
    staleness_seconds: i64,
}

impl LivePositionSet {
    pub fn new(staleness_seconds: i64) -> Self {
        Self {
            records: HashMap::new(),
            staleness_seconds,
        }
    }

    /// Whether a record is admissible right now
    fn admissible(record: &PositionRecord, now: DateTime<Utc>, threshold: i64) -> bool {
        if let Err(why) = record.validate() {
            debug!("Dropping malformed record for {}: {why}", record.user_id);
            return false;
        }
        !record.is_stale(now, threshold)
    }

    /// Replace the whole set from a full fetch, filtering stale and
    /// malformed records at the boundary
    pub fn replace_all(&mut self, records: Vec<PositionRecord>, now: DateTime<Utc>) {
        let threshold = self.staleness_seconds;
        self.records = records
            .into_iter()
            .filter(|r| Self::admissible(r, now, threshold))
            .map(|r| (r.user_id, r))
            .collect();
    }

    /// Apply one pushed change. Returns whether the set changed.
    pub fn apply(&mut self, change: StoreChange, now: DateTime<Utc>) -> bool {
        match change {
            StoreChange::Upsert(record) => {
                if !Self::admissible(&record, now, self.staleness_seconds) {
                    return false;
                }
                self.records.insert(record.user_id, record);
                true
            }
            StoreChange::Delete(user_id) => self.records.remove(&user_id).is_some(),
            StoreChange::Disconnected | StoreChange::Error(_) => false,
        }
    }

    /// Drop records that crossed the staleness threshold since they were
    /// admitted
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let threshold = self.staleness_seconds;
        self.records.retain(|_, r| !r.is_stale(now, threshold));
    }

    pub fn get(&self, user_id: &Uuid) -> Option<&PositionRecord> {
        self.records.get(user_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PositionRecord> {
        self.records.values()
    }

    pub fn drivers(&self) -> impl Iterator<Item = &PositionRecord> {
        self.records.values().filter(|r| r.role == Role::Driver)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
