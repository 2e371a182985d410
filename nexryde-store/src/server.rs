use uuid::Uuid;

use nexryde_logic::TrackingScope;

const fn server_host() -> &'static str {
    if let Some(host) = option_env!("NEXRYDE_STORE_HOST") {
        host
    } else {
        "localhost"
    }
}

const fn server_port() -> &'static str {
    if let Some(port) = option_env!("NEXRYDE_STORE_PORT") {
        port
    } else {
        "4790"
    }
}

const fn server_secure() -> bool {
    if let Some(secure) = option_env!("NEXRYDE_STORE_SECURE") {
        const_str::eq_ignore_ascii_case!(secure, "true") || const_str::equal!(secure, "1")
    } else {
        false
    }
}

const fn server_http_proto() -> &'static str {
    if server_secure() { "https" } else { "http" }
}

const SERVER_HOST: &str = server_host();
const SERVER_PORT: &str = server_port();
const SERVER_HTTP_PROTO: &str = server_http_proto();

const SERVER_SOCKET: &str = const_str::concat!(SERVER_HOST, ":", SERVER_PORT);

const SERVER_HTTP_URL: &str = const_str::concat!(SERVER_HTTP_PROTO, "://", SERVER_SOCKET);

fn scope_query(scope: &TrackingScope) -> String {
    match scope.trip_id() {
        Some(trip) => format!("?trip={trip}"),
        None => String::new(),
    }
}

pub fn positions_url(scope: &TrackingScope) -> String {
    format!("{SERVER_HTTP_URL}/positions{}", scope_query(scope))
}

pub fn feed_url(scope: &TrackingScope) -> String {
    format!("{SERVER_HTTP_URL}/positions/feed{}", scope_query(scope))
}

pub fn delete_url(user_id: Uuid, scope: &TrackingScope) -> String {
    format!("{SERVER_HTTP_URL}/positions/{user_id}{}", scope_query(scope))
}
