use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    geo::{bearing_degrees, haversine_km},
    location::{GeoReading, Location},
    record::{PositionRecord, Role},
};

#[derive(Debug, Clone)]
/// Converts raw device fixes into position records ready for upsert.
/// Derives heading and speed from consecutive fixes and throttles output to
/// a fixed cadence no matter how fast the platform reports.
pub struct PositionPublisher {
    user_id: Uuid,
    role: Role,
    vehicle_label: Option<String>,
    trip_id: Option<Uuid>,
    min_interval: Duration,
    last_published: Option<DateTime<Utc>>,
    last_reading: Option<GeoReading>,
}

impl PositionPublisher {
    pub fn new(
        user_id: Uuid,
        role: Role,
        vehicle_label: Option<String>,
        trip_id: Option<Uuid>,
        min_interval: Duration,
    ) -> Self {
        Self {
            user_id,
            role,
            vehicle_label,
            trip_id,
            min_interval,
            last_published: None,
            last_reading: None,
        }
    }

    fn throttled(&self, now: DateTime<Utc>) -> bool {
        self.last_published.is_some_and(|last| {
            (now - last).num_milliseconds() < self.min_interval.as_millis() as i64
        })
    }

    /// Heading and speed for a fix: derived from the previous fix when one
    /// exists, otherwise whatever the device reported, defaulting to 0
    fn derive_motion(&self, reading: &GeoReading) -> (f64, f64) {
        if let Some(prev) = &self.last_reading {
            let heading = bearing_degrees(prev.loc, reading.loc);
            let elapsed_ms = (reading.timestamp - prev.timestamp).num_milliseconds();
            let speed = if elapsed_ms > 0 {
                let km = haversine_km(prev.loc, reading.loc);
                km / (elapsed_ms as f64 / 3_600_000.0)
            } else {
                reading.speed_kmh.unwrap_or(0.0)
            };
            (heading, speed)
        } else {
            (
                reading.heading.unwrap_or(0.0),
                reading.speed_kmh.unwrap_or(0.0),
            )
        }
    }

    fn record_for(&self, loc: Location, heading: f64, speed: f64, now: DateTime<Utc>) -> PositionRecord {
        PositionRecord {
            user_id: self.user_id,
            role: self.role,
            lat: loc.lat,
            lng: loc.lng,
            heading,
            speed: speed.max(0.0),
            vehicle_label: self.vehicle_label.clone(),
            trip_id: self.trip_id,
            updated_at: now,
        }
    }

    /// Turn a raw fix into a record, or None inside the throttle window
    pub fn make_record(&mut self, reading: GeoReading, now: DateTime<Utc>) -> Option<PositionRecord> {
        if self.throttled(now) {
            // Still remember the fix so motion derivation stays continuous
            self.last_reading = Some(reading);
            return None;
        }

        let (heading, speed) = self.derive_motion(&reading);
        self.last_reading = Some(reading);
        self.last_published = Some(now);

        Some(self.record_for(reading.loc, heading, speed, now))
    }

    /// Record pinned to the fallback coordinate for degraded mode
    pub fn fallback_record(&mut self, fallback: Location, now: DateTime<Utc>) -> Option<PositionRecord> {
        if self.throttled(now) {
            return None;
        }
        self.last_published = Some(now);
        Some(self.record_for(fallback, 0.0, 0.0, now))
    }
}
