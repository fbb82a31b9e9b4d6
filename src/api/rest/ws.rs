use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::trip::LocationSample;
use crate::state::AppState;

/// Streams every domain event (broadcast fills, driver responses, location
/// updates) to dashboard subscribers.
pub async fn events_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_events_socket(socket, state))
}

async fn handle_events_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.events_tx.subscribe();

    info!("event subscriber connected");

    let send_task = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("event subscriber disconnected");
}

/// A driver's live connection. Its presence gates the websocket step of the
/// notification fallback plan; disconnecting only drops the registration.
pub async fn driver_handler(
    ws: WebSocketUpgrade,
    Path(driver_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_driver_socket(socket, state, driver_id))
}

async fn handle_driver_socket(mut socket: WebSocket, state: Arc<AppState>, driver_id: Uuid) {
    state.connected_drivers.insert(driver_id, ());
    info!(driver_id = %driver_id, "driver connected");

    while let Some(Ok(_msg)) = socket.recv().await {}

    state.connected_drivers.remove(&driver_id);
    info!(driver_id = %driver_id, "driver disconnected");
}

/// Live location stream for one trip, backed by the per-trip watch feed:
/// a slow consumer only ever misses intermediate samples, never stalls
/// ingest.
pub async fn track_handler(
    ws: WebSocketUpgrade,
    Path(trip_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let rx = state
        .track_feeds
        .get(&trip_id)
        .map(|feed| feed.subscribe())
        .ok_or_else(|| AppError::NotFound(format!("no tracking session for trip {trip_id}")))?;

    Ok(ws.on_upgrade(move |socket| handle_track_socket(socket, rx, trip_id)))
}

async fn handle_track_socket(
    socket: WebSocket,
    rx: watch::Receiver<Option<LocationSample>>,
    trip_id: Uuid,
) {
    let (mut sender, mut receiver) = socket.split();
    let mut stream = WatchStream::new(rx);

    info!(trip_id = %trip_id, "tracking subscriber connected");

    let send_task = tokio::spawn(async move {
        while let Some(update) = stream.next().await {
            let Some(sample) = update else {
                continue;
            };

            let json = match serde_json::to_string(&sample) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize sample for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!(trip_id = %trip_id, "tracking subscriber disconnected");
}
