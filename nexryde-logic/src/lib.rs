mod geo;
mod live_set;
mod location;
mod markers;
mod matcher;
mod navigation;
mod publisher;
mod record;
mod session;
mod settings;
mod store;

pub use geo::{EARTH_RADIUS_KM, bearing_degrees, haversine_km};
pub use live_set::LivePositionSet;
pub use location::{GeoError, GeoOptions, GeoReading, GeoSource, Location};
pub use markers::{
    Bounds, FIT_PADDING_PX, MapSurface, MarkerIcon, MarkerReconciler, MarkerStyle, marker_style,
};
pub use matcher::{
    DriverDetails, MatchError, MatchQuery, ProviderCandidate, RankedDriver, SERVICE_RADIUS_KM,
    rank_drivers,
};
pub use navigation::directions_url;
pub use publisher::PositionPublisher;
pub use record::{PositionRecord, Role, TrackingScope, VehicleClass};
pub use session::{Id, LiveSnapshot, StateUpdateSender, TrackingHealth, TrackingSession, UtcDT};
pub use settings::{FALLBACK_CENTER, TrackingSettings};
pub use store::{FeedEvent, LocationStore, StoreChange};

pub mod prelude {
    use anyhow::Error as AnyhowError;
    use std::result::Result as StdResult;
    pub type Result<T = (), E = AnyhowError> = StdResult<T, E>;
    pub use anyhow::Context;
}
