use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::location::{GeoOptions, Location};

/// Coordinate published when the platform denies location access, so the
/// rest of the pipeline keeps working in degraded mode. Accra city center.
pub const FALLBACK_CENTER: Location = Location {
    lat: 5.6037,
    lng: -0.1870,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Tunables for one tracking session. This is a browser-embedded module set,
/// configuration lives in code rather than an external surface.
pub struct TrackingSettings {
    /// Cadence position writes are throttled to, independent of how fast the
    /// platform produces raw fixes
    pub publish_interval: Duration,
    /// Cadence of the corrective full re-fetch backing up the change feed
    pub refresh_interval: Duration,
    /// Age in seconds beyond which a record drops out of general feeds
    pub staleness_seconds: i64,
    /// Looser age bound in seconds used when matching pickups
    pub pickup_staleness_seconds: i64,
    /// Where to pretend to be when location access is denied
    pub fallback_location: Location,
    pub geo: GeoOptions,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            publish_interval: Duration::from_secs(1),
            refresh_interval: Duration::from_secs(5),
            staleness_seconds: 120,
            pickup_staleness_seconds: 300,
            fallback_location: FALLBACK_CENTER,
            geo: GeoOptions::default(),
        }
    }
}
