mod state;

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    result::Result as StdResult,
    time::Duration,
};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{delete, get},
};
use futures::stream::{self, Stream};
use log::{info, warn};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use nexryde_logic::PositionRecord;
use state::{ScopeKey, ServerState};

type Result<T = (), E = anyhow::Error> = StdResult<T, E>;

#[derive(Debug, Deserialize)]
struct ScopeParams {
    trip: Option<Uuid>,
}

#[tokio::main]
async fn main() -> Result {
    colog::init();

    let args = std::env::args().collect::<Vec<_>>();
    let socket_addr = args
        .get(1)
        .map(|raw_binding| raw_binding.parse::<SocketAddr>())
        .transpose()
        .context("Invalid socket addr passed")?
        .unwrap_or(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 4790));

    let state = ServerState::default();

    let app = Router::new()
        .route("/positions", get(list_positions).post(upsert_position))
        .route("/positions/feed", get(position_feed))
        .route("/positions/{user_id}", delete(delete_position))
        .with_state(state);

    info!("Position store listening on {socket_addr}");

    let listener = tokio::net::TcpListener::bind(socket_addr)
        .await
        .context("Failed to bind")?;
    axum::serve(listener, app).await.context("Server exited")?;

    Ok(())
}

async fn list_positions(
    State(state): State<ServerState>,
    Query(params): Query<ScopeParams>,
) -> Json<Vec<PositionRecord>> {
    Json(state.list(params.trip))
}

async fn upsert_position(
    State(state): State<ServerState>,
    Query(params): Query<ScopeParams>,
    Json(record): Json<PositionRecord>,
) -> StdResult<StatusCode, (StatusCode, String)> {
    if let Err(why) = record.validate() {
        warn!("Rejecting malformed record for {}: {why}", record.user_id);
        return Err((StatusCode::UNPROCESSABLE_ENTITY, why.to_string()));
    }
    if record.trip_id != params.trip {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "record scope does not match request scope".to_string(),
        ));
    }

    state.upsert(record);
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_position(
    State(state): State<ServerState>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<ScopeParams>,
) -> StatusCode {
    if state.delete(params.trip, user_id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn position_feed(
    State(state): State<ServerState>,
    Query(params): Query<ScopeParams>,
) -> Sse<impl Stream<Item = StdResult<Event, std::convert::Infallible>>> {
    let rx = state.subscribe();
    let scope: ScopeKey = params.trip;

    let stream = stream::unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok((event_scope, event)) => {
                    if event_scope != scope {
                        continue;
                    }
                    let Ok(event) = Event::default().json_data(&event) else {
                        continue;
                    };
                    return Some((Ok(event), rx));
                }
                Err(RecvError::Lagged(missed)) => {
                    // Slow subscribers miss events, the clients' periodic
                    // re-fetch covers the gap
                    warn!("Feed subscriber lagged, skipped {missed} events");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
