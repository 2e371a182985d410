use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use chrono::{DateTime, Utc};
use log::{error, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tokio::sync::RwLock;

use crate::{
    live_set::LivePositionSet,
    location::{GeoError, GeoSource},
    prelude::*,
    publisher::PositionPublisher,
    record::{Role, TrackingScope},
    settings::TrackingSettings,
    store::{LocationStore, StoreChange},
};

pub type Id = Uuid;

/// Convenience alias for UTC DT
pub type UtcDT = DateTime<Utc>;

pub trait StateUpdateSender: Send + Sync {
    fn send_update(&self);
}

const STATUS_PERMISSION_DENIED: &str = "location permission denied";
const STATUS_WRITE_FAILED: &str = "failed to update location";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
/// Publisher health as shown by the UI status indicator
pub enum TrackingHealth {
    NotTracking,
    Tracking,
    /// Tracking continues in degraded mode, with the reason to display
    Degraded(&'static str),
}

#[derive(Debug)]
struct SessionState {
    live: LivePositionSet,
    publisher: PositionPublisher,
    health: TrackingHealth,
    /// Set once the change feed has failed and we are in poll-only mode
    feed_down: bool,
}

#[derive(Debug, Clone, Serialize)]
/// Subset of session state meant for a UI frontend or a matching pass
pub struct LiveSnapshot {
    /// ID of the local actor
    pub my_id: Uuid,
    pub health: TrackingHealth,
    /// Whether the change feed is down and only polling keeps us current
    pub feed_down: bool,
    pub positions: LivePositionSet,
}

/// One client's live tracking loop: publishes the local actor's position,
/// mirrors everyone else's through [LocationStore], and owns all tracking
/// state for a single map view. Construct one per view and tear it down
/// explicitly with [Self::stop_tracking].
pub struct TrackingSession<G: GeoSource, S: LocationStore, U: StateUpdateSender> {
    state: RwLock<SessionState>,
    store: Arc<S>,
    geo: G,
    updates: U,
    scope: TrackingScope,
    settings: TrackingSettings,
    cancel: CancellationToken,
    running: AtomicBool,
}

impl<G: GeoSource, S: LocationStore, U: StateUpdateSender> TrackingSession<G, S, U> {
    pub fn new(
        settings: TrackingSettings,
        scope: TrackingScope,
        role: Role,
        vehicle_label: Option<String>,
        store: Arc<S>,
        geo: G,
        updates: U,
    ) -> Self {
        let publisher = PositionPublisher::new(
            store.self_id(),
            role,
            vehicle_label,
            scope.trip_id(),
            settings.publish_interval,
        );

        Self {
            state: RwLock::new(SessionState {
                live: LivePositionSet::new(settings.staleness_seconds),
                publisher,
                health: TrackingHealth::NotTracking,
                feed_down: false,
            }),
            store,
            geo,
            updates,
            scope,
            settings,
            cancel: CancellationToken::new(),
            running: AtomicBool::new(false),
        }
    }

    pub async fn snapshot(&self) -> LiveSnapshot {
        let state = self.state.read().await;
        LiveSnapshot {
            my_id: self.store.self_id(),
            health: state.health,
            feed_down: state.feed_down,
            positions: state.live.clone(),
        }
    }

    pub async fn health(&self) -> TrackingHealth {
        self.state.read().await.health
    }

    /// Full re-fetch correcting whatever the feed missed. On failure the
    /// previous set is kept, a transient error must not blank the map.
    async fn refresh(&self, state: &mut SessionState, now: UtcDT) {
        match self.store.fetch_all(&self.scope).await {
            Ok(records) => {
                state.live.replace_all(records, now);
                self.updates.send_update();
            }
            Err(why) => {
                warn!("Failed to fetch positions: {why:?}");
            }
        }
    }

    async fn publish_tick(&self, state: &mut SessionState, now: UtcDT) {
        let mut denied = false;
        let record = match self.geo.poll() {
            Ok(Some(reading)) => state.publisher.make_record(reading, now),
            Ok(None) => None,
            Err(GeoError::PermissionDenied) => {
                denied = true;
                state
                    .publisher
                    .fallback_record(self.settings.fallback_location, now)
            }
            Err(why) => {
                warn!("Location read failed: {why}");
                None
            }
        };

        let Some(record) = record else {
            if denied && state.health != TrackingHealth::Degraded(STATUS_PERMISSION_DENIED) {
                state.health = TrackingHealth::Degraded(STATUS_PERMISSION_DENIED);
                self.updates.send_update();
            }
            return;
        };

        let write_ok = match self.store.upsert(&record).await {
            Ok(()) => true,
            Err(why) => {
                error!("Failed to update location: {why:?}");
                false
            }
        };

        state.health = if denied {
            TrackingHealth::Degraded(STATUS_PERMISSION_DENIED)
        } else if write_ok {
            TrackingHealth::Tracking
        } else {
            TrackingHealth::Degraded(STATUS_WRITE_FAILED)
        };

        // Mirror the write locally so our own marker never waits on the feed
        state.live.apply(StoreChange::Upsert(record), now);
        self.updates.send_update();
    }

    /// Returns whether the session loop should be broken
    fn consume_change(&self, state: &mut SessionState, change: StoreChange, now: UtcDT) -> bool {
        match change {
            StoreChange::Disconnected => true,
            StoreChange::Error(why) => {
                warn!("Change feed failed, falling back to polling: {why}");
                state.feed_down = true;
                false
            }
            change => {
                if let StoreChange::Upsert(record) = &change {
                    // The feed is scope-filtered server side, but a record
                    // from the wrong scope must never land in the set
                    if !self.scope.includes(record) {
                        return false;
                    }
                }
                if state.live.apply(change, now) {
                    self.updates.send_update();
                }
                false
            }
        }
    }

    #[cfg(test)]
    fn get_now() -> UtcDT {
        let fake = tokio::time::Instant::now();
        let real = std::time::Instant::now();
        Utc::now() + (fake.into_std().duration_since(real) + std::time::Duration::from_secs(1))
    }

    #[cfg(not(test))]
    fn get_now() -> UtcDT {
        Utc::now()
    }

    /// Main loop of the session: publishes on a fixed cadence, applies
    /// pushed changes, and periodically re-fetches as the ordering
    /// correction. Runs until [Self::stop_tracking] or a deliberate store
    /// disconnect. Calling this while the loop is already running is a
    /// no-op.
    pub async fn main_loop(&self) -> Result {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(why) = self.geo.start_watch(&self.settings.geo) {
            // Degraded from the start, publish ticks will fall back
            warn!("Could not start location watch: {why}");
        }

        let mut publish = tokio::time::interval(self.settings.publish_interval);
        let mut refresh = tokio::time::interval(self.settings.refresh_interval);

        'session: loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    break 'session;
                }

                changes = self.store.receive_changes() => {
                    let mut state = self.state.write().await;
                    let now = Self::get_now();
                    for change in changes {
                        if self.consume_change(&mut state, change, now) {
                            break 'session;
                        }
                    }
                }

                _ = publish.tick() => {
                    let mut state = self.state.write().await;
                    self.publish_tick(&mut state, Self::get_now()).await;
                }

                _ = refresh.tick() => {
                    let mut state = self.state.write().await;
                    let now = Self::get_now();
                    state.live.prune(now);
                    self.refresh(&mut state, now).await;
                }
            }
        }

        self.teardown().await;

        Ok(())
    }

    /// Best-effort cleanup in a fixed order: location watch, change feed,
    /// then the actor's own record. Each step tolerates the others failing.
    async fn teardown(&self) {
        self.geo.stop_watch();
        self.store.disconnect().await;
        if let Err(why) = self.store.delete_own().await {
            warn!("Failed to remove own position record: {why:?}");
        }

        let mut state = self.state.write().await;
        state.health = TrackingHealth::NotTracking;
        self.running.store(false, Ordering::SeqCst);
        self.updates.send_update();
    }

    pub async fn stop_tracking(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        settings::FALLBACK_CENTER,
        tests::{DummySender, MockGeo, MockStore, reading},
    };

    use super::*;
    use std::time::Duration;
    use tokio::{sync::oneshot, task::yield_now, test};

    type TestSession = TrackingSession<MockGeo, MockStore, DummySender>;

    type EndRecv = oneshot::Receiver<Result>;

    const INTERVAL: Duration = Duration::from_secs(600_000);

    fn mk_settings() -> TrackingSettings {
        // Staleness must outlive many of the huge test intervals, the
        // threshold itself is covered by the live set's unit tests
        TrackingSettings {
            publish_interval: INTERVAL,
            refresh_interval: INTERVAL,
            staleness_seconds: INTERVAL.as_secs() as i64 * 100,
            pickup_staleness_seconds: INTERVAL.as_secs() as i64 * 100,
            ..Default::default()
        }
    }

    struct MockFleet {
        uuids: Vec<Uuid>,
        sessions: Vec<Arc<TestSession>>,
    }

    impl MockFleet {
        fn new(specs: Vec<(Role, MockGeo)>) -> Self {
            tokio::time::pause();
            let (uuids, stores) = MockStore::create_cluster(specs.len() as u32);

            let sessions = specs
                .into_iter()
                .zip(stores)
                .map(|((role, geo), store)| {
                    Arc::new(TestSession::new(
                        mk_settings(),
                        TrackingScope::Global,
                        role,
                        None,
                        Arc::new(store),
                        geo,
                        DummySender,
                    ))
                })
                .collect();

            Self { uuids, sessions }
        }

        async fn start(&self) -> Vec<EndRecv> {
            let mut recvs = Vec::with_capacity(self.sessions.len());
            for session in self.sessions.iter() {
                let session = session.clone();
                let (send, recv) = oneshot::channel();
                recvs.push(recv);
                tokio::spawn(async move {
                    let res = session.main_loop().await;
                    send.send(res).ok();
                });
                yield_now().await;
            }
            recvs
        }

        async fn wait_for_stores(&self) {
            for session in self.sessions.iter() {
                session.store.wait_for_queue_empty().await;
            }
        }

        async fn tick(&self) {
            tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
            self.wait_for_stores().await;
            yield_now().await;
        }

        async fn assert_all_snapshots(&self, f: impl Fn(usize, &LiveSnapshot)) {
            for (i, session) in self.sessions.iter().enumerate() {
                let snap = session.snapshot().await;
                f(i, &snap);
            }
        }
    }

    fn fixed_geo(lat: f64, lng: f64) -> MockGeo {
        MockGeo::fixed(reading(lat, lng))
    }

    #[test]
    async fn test_everyone_sees_everyone() {
        let fleet = MockFleet::new(vec![
            (Role::Driver, fixed_geo(5.60, -0.18)),
            (Role::Passenger, fixed_geo(5.61, -0.19)),
            (Role::Passenger, fixed_geo(5.62, -0.20)),
        ]);

        fleet.start().await;
        fleet.tick().await;

        fleet
            .assert_all_snapshots(|i, snap| {
                assert_eq!(snap.positions.len(), 3, "Session {i} is missing actors");
                for (j, id) in fleet.uuids.iter().enumerate() {
                    assert!(
                        snap.positions.get(id).is_some(),
                        "Session {i} does not see actor {j}"
                    );
                }
                let driver = snap.positions.get(&fleet.uuids[0]).unwrap();
                assert_eq!(driver.role, Role::Driver);
                assert_eq!(snap.health, TrackingHealth::Tracking);
            })
            .await;
    }

    #[test]
    async fn test_stop_deletes_record() {
        let fleet = MockFleet::new(vec![
            (Role::Passenger, fixed_geo(5.60, -0.18)),
            (Role::Driver, fixed_geo(5.61, -0.19)),
        ]);

        let mut recvs = fleet.start().await;
        fleet.tick().await;

        fleet.sessions[1].stop_tracking().await;
        let res = recvs.swap_remove(1).await.expect("Failed to recv");
        assert!(res.is_ok(), "Session 1 did not exit cleanly");

        fleet.wait_for_stores().await;
        fleet.tick().await;

        let gone = fleet.uuids[1];
        let snap = fleet.sessions[0].snapshot().await;
        assert!(
            snap.positions.get(&gone).is_none(),
            "Stopped actor still visible to others"
        );

        let records = fleet.sessions[0]
            .store
            .fetch_all(&TrackingScope::Global)
            .await
            .expect("Fetch failed");
        assert!(
            records.iter().all(|r| r.user_id != gone),
            "Stopped actor still in the store"
        );

        assert_eq!(
            fleet.sessions[1].health().await,
            TrackingHealth::NotTracking
        );
    }

    #[test]
    async fn test_permission_denied_falls_back() {
        let fleet = MockFleet::new(vec![
            (Role::Driver, MockGeo::denied()),
            (Role::Passenger, fixed_geo(5.61, -0.19)),
        ]);

        fleet.start().await;
        fleet.tick().await;

        assert_eq!(
            fleet.sessions[0].health().await,
            TrackingHealth::Degraded("location permission denied")
        );

        // The degraded session still publishes, pinned to the city center
        let snap = fleet.sessions[1].snapshot().await;
        let record = snap
            .positions
            .get(&fleet.uuids[0])
            .expect("Degraded actor not published");
        assert_eq!(record.location(), FALLBACK_CENTER);
    }

    #[test]
    async fn test_feed_error_degrades_to_polling() {
        let fleet = MockFleet::new(vec![
            (Role::Driver, fixed_geo(5.60, -0.18)),
            (Role::Passenger, fixed_geo(5.61, -0.19)),
        ]);

        fleet.start().await;
        fleet.tick().await;

        fleet.sessions[1]
            .store
            .inject(StoreChange::Error("feed gone".to_string()))
            .await;
        fleet.wait_for_stores().await;
        yield_now().await;

        let snap = fleet.sessions[1].snapshot().await;
        assert!(snap.feed_down, "Feed failure not recorded");

        // The loop must keep running on the re-fetch path
        fleet.tick().await;
        let snap = fleet.sessions[1].snapshot().await;
        assert_eq!(snap.positions.len(), 2);
        assert_eq!(snap.health, TrackingHealth::Tracking);
    }

    #[test]
    async fn test_double_start_is_noop() {
        let fleet = MockFleet::new(vec![(Role::Driver, fixed_geo(5.60, -0.18))]);

        fleet.start().await;
        yield_now().await;

        // The loop is already running, a second call returns immediately
        // instead of spawning a duplicate writer
        fleet.sessions[0]
            .main_loop()
            .await
            .expect("Second start must be a clean no-op");

        fleet.tick().await;
        let snap = fleet.sessions[0].snapshot().await;
        assert_eq!(snap.positions.len(), 1);
    }

    #[test]
    async fn test_refresh_corrects_missed_changes() {
        let fleet = MockFleet::new(vec![
            (Role::Driver, fixed_geo(5.60, -0.18)),
            (Role::Passenger, fixed_geo(5.61, -0.19)),
        ]);

        fleet.start().await;
        fleet.tick().await;

        // Sneak a record into the table without notifying anyone, as if the
        // push for it had been dropped
        let ghost = Uuid::new_v4();
        fleet.sessions[0]
            .store
            .insert_silently(crate::record::PositionRecord {
                user_id: ghost,
                role: Role::Driver,
                lat: 5.63,
                lng: -0.21,
                heading: 0.0,
                speed: 0.0,
                vehicle_label: None,
                trip_id: None,
                updated_at: TestSession::get_now(),
            });

        fleet.tick().await;

        fleet
            .assert_all_snapshots(|i, snap| {
                assert!(
                    snap.positions.get(&ghost).is_some(),
                    "Session {i} never re-fetched the missed record"
                );
            })
            .await;
    }

    #[test]
    async fn test_scoped_sessions_stay_separate() {
        // Two stores in one cluster, but the sessions track different trips
        tokio::time::pause();
        let (uuids, stores) = MockStore::create_cluster(2);
        let trip = Uuid::new_v4();
        let mut stores = stores.into_iter();

        let scoped = Arc::new(TestSession::new(
            mk_settings(),
            TrackingScope::Trip(trip),
            Role::Driver,
            None,
            Arc::new(stores.next().unwrap()),
            fixed_geo(5.60, -0.18),
            DummySender,
        ));
        let global = Arc::new(TestSession::new(
            mk_settings(),
            TrackingScope::Global,
            Role::Passenger,
            None,
            Arc::new(stores.next().unwrap()),
            fixed_geo(5.61, -0.19),
            DummySender,
        ));

        for session in [scoped.clone(), global.clone()] {
            tokio::spawn(async move {
                session.main_loop().await.ok();
            });
            yield_now().await;
        }

        tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
        scoped.store.wait_for_queue_empty().await;
        global.store.wait_for_queue_empty().await;
        yield_now().await;

        // Each session's re-fetch only returns its own scope. The feed may
        // still deliver the other scope's record, which is why records carry
        // their trip id and fetches filter on it.
        let records = global
            .store
            .fetch_all(&TrackingScope::Global)
            .await
            .expect("Fetch failed");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_id, uuids[1]);

        let records = scoped
            .store
            .fetch_all(&TrackingScope::Trip(trip))
            .await
            .expect("Fetch failed");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_id, uuids[0]);
        assert_eq!(records[0].trip_id, Some(trip));
    }
}
