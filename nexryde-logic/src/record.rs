use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{location::Location, prelude::*};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Which side of a ride an actor is on
pub enum Role {
    Driver,
    Passenger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Vehicle classes offered on campus
pub enum VehicleClass {
    Pragia,
    Taxi,
    Shuttle,
}

impl VehicleClass {
    /// Best-effort read of a class out of a free-text vehicle label
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.to_ascii_lowercase();
        if label.contains("pragia") {
            Some(Self::Pragia)
        } else if label.contains("taxi") {
            Some(Self::Taxi)
        } else if label.contains("shuttle") {
            Some(Self::Shuttle)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Which deployment mode a session tracks in: the one global table, or
/// records scoped to a single trip. The two modes are distinct, records from
/// one never show up in the other.
pub enum TrackingScope {
    Global,
    Trip(Uuid),
}

impl TrackingScope {
    pub fn trip_id(&self) -> Option<Uuid> {
        match self {
            TrackingScope::Global => None,
            TrackingScope::Trip(id) => Some(*id),
        }
    }

    /// Whether a record belongs to this scope
    pub fn includes(&self, record: &PositionRecord) -> bool {
        record.trip_id == self.trip_id()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// One actor's last known physical state as stored in the shared table.
/// At most one live record exists per actor, latest write wins.
pub struct PositionRecord {
    pub user_id: Uuid,
    pub role: Role,
    pub lat: f64,
    pub lng: f64,
    /// Degrees, 0-360
    pub heading: f64,
    /// km/h, never negative
    pub speed: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl PositionRecord {
    pub fn location(&self) -> Location {
        Location {
            lat: self.lat,
            lng: self.lng,
        }
    }

    /// Seconds since the record was written. Negative for records stamped in
    /// the future (clock skew), which count as fresh.
    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.updated_at).num_seconds()
    }

    pub fn is_stale(&self, now: DateTime<Utc>, threshold_seconds: i64) -> bool {
        self.age_seconds(now) >= threshold_seconds
    }

    /// Schema check applied at the store boundary so rendering and matching
    /// can rely on shape guarantees instead of scattered null checks.
    pub fn validate(&self) -> Result {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            bail!("latitude out of range: {}", self.lat);
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            bail!("longitude out of range: {}", self.lng);
        }
        if !self.heading.is_finite() || !(0.0..=360.0).contains(&self.heading) {
            bail!("heading out of range: {}", self.heading);
        }
        if !self.speed.is_finite() || self.speed < 0.0 {
            bail!("speed must be non-negative, got {}", self.speed);
        }
        Ok(())
    }
}
