use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::coordinator::{self, CommitRequest};
use crate::engine::registry::{self, CreateBroadcast};
use crate::error::AppError;
use crate::models::assignment::{Assignment, DriverVehiclePair};
use crate::models::broadcast::{Broadcast, FareTerms, Route};
use crate::models::principal::Principal;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/broadcasts", post(create_broadcast))
        .route("/broadcasts/:id", get(get_broadcast))
        .route("/broadcasts/:id/cancel", post(cancel_broadcast))
        .route("/broadcasts/:id/assignments", post(commit_assignment))
}

#[derive(Deserialize)]
pub struct CreateBroadcastRequest {
    pub demand: u32,
    pub vehicle_type: String,
    pub route: Route,
    pub fare: FareTerms,
    pub expiry: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct CommitAssignmentRequest {
    pub transporter_id: Uuid,
    pub truck_count: u32,
    pub pairs: Vec<DriverVehiclePair>,
}

async fn create_broadcast(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateBroadcastRequest>,
) -> Result<Json<Broadcast>, AppError> {
    if payload.vehicle_type.trim().is_empty() {
        return Err(AppError::Validation(
            "vehicle_type cannot be empty".to_string(),
        ));
    }

    let broadcast = registry::create(
        &state,
        CreateBroadcast {
            demand: payload.demand,
            vehicle_type: payload.vehicle_type,
            route: payload.route,
            fare: payload.fare,
            expiry: payload.expiry,
        },
    )?;

    Ok(Json(broadcast))
}

async fn get_broadcast(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Broadcast>, AppError> {
    Ok(Json(registry::query(&state, id)?))
}

async fn cancel_broadcast(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Broadcast>, AppError> {
    Ok(Json(registry::cancel(&state, id)?))
}

async fn commit_assignment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CommitAssignmentRequest>,
) -> Result<Json<Assignment>, AppError> {
    let assignment = coordinator::commit(
        &state,
        id,
        CommitRequest {
            principal: Principal::transporter(payload.transporter_id),
            truck_count: payload.truck_count,
            pairs: payload.pairs,
        },
    )?;

    Ok(Json(assignment))
}
