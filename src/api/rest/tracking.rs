use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::tracking::{self, TrackingSnapshot};
use crate::error::AppError;
use crate::models::trip::{LocationSample, MilestoneKind, Trip};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tracking/:id", get(get_tracking))
        .route("/tracking/:id/location", post(ingest_location))
        .route("/tracking/:id/history", get(get_history))
        .route("/tracking/:id/milestone", post(mark_milestone))
        .route("/tracking/:id/ws", get(super::ws::track_handler))
}

#[derive(Deserialize)]
pub struct IngestRequest {
    pub lat: f64,
    pub lng: f64,
    pub speed_kmh: f64,
    pub heading_deg: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct HistoryRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct MilestoneRequest {
    pub kind: MilestoneKind,
}

async fn ingest_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<IngestRequest>,
) -> Result<Json<TrackingSnapshot>, AppError> {
    tracking::ingest(
        &state,
        id,
        LocationSample {
            lat: payload.lat,
            lng: payload.lng,
            speed_kmh: payload.speed_kmh,
            heading_deg: payload.heading_deg,
            recorded_at: payload.recorded_at,
        },
    )?;

    Ok(Json(tracking::query(&state, id)?))
}

async fn get_tracking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TrackingSnapshot>, AppError> {
    Ok(Json(tracking::query(&state, id)?))
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(range): Query<HistoryRange>,
) -> Result<Json<Vec<LocationSample>>, AppError> {
    Ok(Json(tracking::history(&state, id, range.from, range.to)?))
}

async fn mark_milestone(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<MilestoneRequest>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(tracking::mark_milestone(&state, id, payload.kind)?))
}
