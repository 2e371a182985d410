use std::sync::Mutex;

use chrono::Utc;
use log::info;
use rand::Rng;
use uuid::Uuid;

use nexryde_logic::{
    Bounds, DriverDetails, GeoError, GeoOptions, GeoReading, GeoSource, Location, MapSurface,
    MarkerStyle, StateUpdateSender, VehicleClass,
};

pub mod prelude {
    pub use anyhow::{Context, anyhow, bail};
    pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;
}

pub use prelude::*;

struct SimGeoState {
    leg: usize,
    progress: f64,
}

/// Route playback with jitter, standing in for a phone moving across town
pub struct SimGeo {
    waypoints: Vec<Location>,
    /// Fraction of the current leg covered per poll
    step: f64,
    state: Mutex<SimGeoState>,
}

impl SimGeo {
    pub fn new(waypoints: Vec<Location>, step: f64) -> Self {
        Self {
            waypoints,
            step,
            state: Mutex::new(SimGeoState {
                leg: 0,
                progress: 0.0,
            }),
        }
    }

    /// A small square loop around a center point
    pub fn circuit(center: Location, radius_deg: f64) -> Self {
        let offsets: [(f64, f64); 4] = [(1.0, 0.0), (0.0, 1.0), (-1.0, 0.0), (0.0, -1.0)];
        let waypoints = offsets
            .iter()
            .map(|(dlat, dlng)| {
                Location::new(center.lat + dlat * radius_deg, center.lng + dlng * radius_deg)
            })
            .collect();
        Self::new(waypoints, 0.05)
    }
}

impl GeoSource for SimGeo {
    fn start_watch(&self, _options: &GeoOptions) -> Result<(), GeoError> {
        if self.waypoints.is_empty() {
            Err(GeoError::Unavailable)
        } else {
            Ok(())
        }
    }

    fn poll(&self) -> Result<Option<GeoReading>, GeoError> {
        if self.waypoints.is_empty() {
            return Err(GeoError::Unavailable);
        }

        let mut state = self.state.lock().unwrap();
        let from = self.waypoints[state.leg % self.waypoints.len()];
        let to = self.waypoints[(state.leg + 1) % self.waypoints.len()];
        let t = state.progress;

        state.progress += self.step;
        if state.progress >= 1.0 {
            state.progress = 0.0;
            state.leg += 1;
        }

        let mut rng = rand::rng();
        let loc = Location::new(
            from.lat + (to.lat - from.lat) * t + rng.random_range(-0.00002..0.00002),
            from.lng + (to.lng - from.lng) * t + rng.random_range(-0.00002..0.00002),
        );

        Ok(Some(GeoReading {
            loc,
            heading: None,
            speed_kmh: None,
            accuracy_m: Some(8.0),
            timestamp: Utc::now(),
        }))
    }
}

#[derive(Debug, Default)]
/// Map sink that narrates marker commands to the log, used to eyeball the
/// renderer without a real map widget
pub struct LogSurface;

impl MapSurface for LogSurface {
    fn add_marker(&mut self, id: Uuid, loc: Location, style: MarkerStyle) {
        info!(
            "+ marker {id} at ({:.5}, {:.5}) {:?} {}",
            loc.lat, loc.lng, style.icon, style.color
        );
    }

    fn move_marker(&mut self, id: Uuid, loc: Location, style: MarkerStyle) {
        info!(
            "> marker {id} to ({:.5}, {:.5}) rot {:.0}",
            loc.lat, loc.lng, style.rotation_deg
        );
    }

    fn remove_marker(&mut self, id: Uuid) {
        info!("- marker {id}");
    }

    fn fit_bounds(&mut self, bounds: Bounds, padding_px: u32) {
        info!(
            "~ fit ({:.5}, {:.5})..({:.5}, {:.5}) pad {padding_px}px",
            bounds.min_lat, bounds.min_lng, bounds.max_lat, bounds.max_lng
        );
    }
}

pub struct LogSender;

impl StateUpdateSender for LogSender {
    fn send_update(&self) {}
}

/// Canned driver metadata for simulated fleets
pub fn demo_details(vehicle: VehicleClass, slot: u32) -> DriverDetails {
    DriverDetails {
        vehicle,
        rating: 3.5 + (slot % 3) as f64 * 0.5,
        seats_taken: 0,
        capacity: match vehicle {
            VehicleClass::Pragia => 3,
            VehicleClass::Taxi => 4,
            VehicleClass::Shuttle => 12,
        },
        completed_trips: 20 + slot * 25,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_geo_moves() {
        let geo = SimGeo::circuit(Location::new(5.6037, -0.1870), 0.01);
        geo.start_watch(&GeoOptions::default()).expect("Watch failed");

        let first = geo.poll().expect("Poll failed").expect("No fix");
        for _ in 0..5 {
            geo.poll().expect("Poll failed");
        }
        let later = geo.poll().expect("Poll failed").expect("No fix");

        assert!(
            nexryde_logic::haversine_km(first.loc, later.loc) > 0.01,
            "Simulated phone never moved"
        );
    }

    #[test]
    fn test_empty_route_is_unavailable() {
        let geo = SimGeo::new(vec![], 0.1);
        assert_eq!(geo.poll().unwrap_err(), GeoError::Unavailable);
    }
}
