use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::{dispatcher, response};
use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::models::broadcast::GeoPoint;
use crate::models::notification::Notification;
use crate::models::principal::Principal;
use crate::models::trip::Trip;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications/:id", get(get_notification))
        .route("/notifications/:id/read", post(mark_read))
        .route("/notifications/:id/accept", post(accept))
        .route("/notifications/:id/decline", post(decline))
}

#[derive(Deserialize)]
pub struct AcceptRequest {
    pub driver_id: Uuid,
    pub location: GeoPoint,
}

#[derive(Deserialize)]
pub struct DeclineRequest {
    pub driver_id: Uuid,
    pub reason: Option<String>,
}

async fn get_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    let notification = state
        .notifications
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))?;

    Ok(Json(notification.value().clone()))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    Ok(Json(dispatcher::mark_read(&state, id)?))
}

async fn accept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcceptRequest>,
) -> Result<Json<Trip>, AppError> {
    let trip = response::accept(
        &state,
        id,
        Principal::driver(payload.driver_id),
        payload.location,
    )?;

    Ok(Json(trip))
}

async fn decline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DeclineRequest>,
) -> Result<Json<Assignment>, AppError> {
    let assignment = response::decline(
        &state,
        id,
        Principal::driver(payload.driver_id),
        payload.reason,
    )?;

    Ok(Json(assignment))
}
