use crate::location::Location;

const DIRECTIONS_BASE: &str = "https://www.google.com/maps/dir/?api=1";

fn fmt_point(loc: Location) -> String {
    format!("{:.6},{:.6}", loc.lat, loc.lng)
}

/// Deep link into the external maps app with a prefilled driving route.
/// Opening it in a new browsing context is a fire-and-forget side effect
/// left to the caller.
pub fn directions_url(origin: Location, destination: Location, waypoints: &[Location]) -> String {
    let mut url = format!(
        "{DIRECTIONS_BASE}&origin={}&destination={}&travelmode=driving",
        fmt_point(origin),
        fmt_point(destination),
    );

    if !waypoints.is_empty() {
        let joined = waypoints
            .iter()
            .map(|w| fmt_point(*w))
            .collect::<Vec<_>>()
            .join("%7C");
        url.push_str("&waypoints=");
        url.push_str(&joined);
    }

    url
}
