use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A "part" of a coordinate
pub type Coord = f64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
/// Some point in the world as reported by a geolocation API
pub struct Location {
    /// Latitude
    pub lat: Coord,
    /// Longitude
    pub lng: Coord,
}

impl Location {
    pub fn new(lat: Coord, lng: Coord) -> Self {
        Self { lat, lng }
    }

    /// Whether this point can be used for distance math at all. Exactly
    /// (0, 0) is what broken clients report when they have no fix, so it
    /// counts as no location.
    pub fn is_usable(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
            && !(self.lat == 0.0 && self.lng == 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// One raw fix from the platform's location watcher
pub struct GeoReading {
    pub loc: Location,
    /// Device heading in degrees, GPS can't always determine
    pub heading: Option<f64>,
    /// Device ground speed in km/h
    pub speed_kmh: Option<f64>,
    /// Accuracy radius in meters
    pub accuracy_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
/// Options passed down to the platform's location watcher
pub struct GeoOptions {
    pub enable_high_accuracy: bool,
    /// How long a single read may take before it fails with
    /// [GeoError::Timeout]
    pub timeout_ms: u32,
    /// How old a cached platform fix may be and still be served
    pub maximum_age_ms: u32,
}

impl Default for GeoOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout_ms: 10_000,
            maximum_age_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Ways a location read can fail. All of these are recoverable, the session
/// keeps running in degraded mode.
pub enum GeoError {
    /// The platform refused location access
    PermissionDenied,
    /// No geolocation capability on this platform
    Unavailable,
    /// The read did not complete within [GeoOptions::timeout_ms]
    Timeout,
}

impl fmt::Display for GeoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeoError::PermissionDenied => write!(f, "location permission denied"),
            GeoError::Unavailable => write!(f, "no geolocation capability"),
            GeoError::Timeout => write!(f, "location read timed out"),
        }
    }
}

impl std::error::Error for GeoError {}

/// Platform seam for the device location stream
pub trait GeoSource: Send + Sync {
    /// Begin watching the platform location stream
    fn start_watch(&self, options: &GeoOptions) -> Result<(), GeoError>;
    /// Latest fix from the watch, if a new one is available
    fn poll(&self) -> Result<Option<GeoReading>, GeoError>;
    /// Stop the watch, further polls return nothing
    fn stop_watch(&self) {}
}
