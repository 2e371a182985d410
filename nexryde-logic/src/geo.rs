use crate::location::Location;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

fn to_radians(degrees: f64) -> f64 {
    degrees * std::f64::consts::PI / 180.0
}

/// Great-circle distance between two points on a spherical earth, in km
pub fn haversine_km(from: Location, to: Location) -> f64 {
    let lat1_rad = to_radians(from.lat);
    let lat2_rad = to_radians(to.lat);

    let dlat = to_radians(to.lat - from.lat);
    let dlng = to_radians(to.lng - from.lng);

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Initial great-circle bearing from one point towards another, in degrees
/// normalized to 0-360
pub fn bearing_degrees(from: Location, to: Location) -> f64 {
    let lat1_rad = to_radians(from.lat);
    let lat2_rad = to_radians(to.lat);
    let dlng = to_radians(to.lng - from.lng);

    let y = dlng.sin() * lat2_rad.cos();
    let x = lat1_rad.cos() * lat2_rad.sin() - lat1_rad.sin() * lat2_rad.cos() * dlng.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Degrees of latitude spanning one km along a meridian on the 6371 km
    /// sphere
    const ONE_KM_LAT: f64 = 0.008993;

    #[test]
    fn test_haversine_one_km() {
        let a = Location::new(5.6, -0.19);
        let b = Location::new(5.6 + ONE_KM_LAT, -0.19);
        let d = haversine_km(a, b);
        assert!((d - 1.0).abs() < 0.01, "Expected ~1 km, got {d}");
    }

    #[test]
    fn test_haversine_accra_kumasi() {
        let accra = Location::new(5.6037, -0.1870);
        let kumasi = Location::new(6.6885, -1.6244);
        let d = haversine_km(accra, kumasi);
        assert!((195.0..205.0).contains(&d), "Expected ~200 km, got {d}");
    }

    #[test]
    fn test_haversine_zero() {
        let a = Location::new(5.6037, -0.1870);
        assert_eq!(haversine_km(a, a), 0.0);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = Location::new(5.6, -0.19);
        let north = Location::new(5.7, -0.19);
        let east = Location::new(5.6, -0.09);

        assert!(bearing_degrees(origin, north).abs() < 0.01);
        assert!((bearing_degrees(origin, east) - 90.0).abs() < 0.5);
    }
}
