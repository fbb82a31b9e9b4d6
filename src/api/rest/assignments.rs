use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::models::notification::Notification;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/assignments/:id", get(get_assignment))
        .route(
            "/driver-assignments/:id/notification",
            get(get_driver_assignment_notification),
        )
}

async fn get_assignment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Assignment>, AppError> {
    let assignment = state
        .assignments
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("assignment {id} not found")))?;

    Ok(Json(assignment.value().clone()))
}

async fn get_driver_assignment_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    let notification_id = *state
        .notification_index
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("no notification for driver assignment {id}")))?;

    let notification = state
        .notifications
        .get(&notification_id)
        .ok_or_else(|| AppError::NotFound(format!("notification {notification_id} not found")))?;

    Ok(Json(notification.value().clone()))
}
