use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::coordinator;
use crate::error::AppError;
use crate::models::event::DomainEvent;
use crate::models::trip::{LocationSample, MilestoneKind, Trip, TripStatus};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TrackingSnapshot {
    pub trip_id: Uuid,
    pub trip_status: TripStatus,
    pub current: Option<LocationSample>,
    pub last_update_ts: Option<DateTime<Utc>>,
    pub frozen: bool,
}

/// Appends a location sample for a live trip. History is bounded
/// (drop-oldest) and the "current" view is monotonic: an older sample is
/// kept in history but never regresses what subscribers see. Fan-out goes
/// through a `watch` feed, so ingest never waits on a slow subscriber.
pub fn ingest(state: &AppState, trip_id: Uuid, sample: LocationSample) -> Result<(), AppError> {
    let advanced = {
        let mut session = state
            .tracking
            .get_mut(&trip_id)
            .ok_or_else(|| AppError::NotFound(format!("no tracking session for trip {trip_id}")))?;

        if session.frozen {
            return Err(AppError::TripTerminal(format!(
                "trip {trip_id} no longer accepts location updates"
            )));
        }

        if session.history.len() >= state.settings.tracking_history_limit {
            session.history.pop_front();
        }
        session.history.push_back(sample.clone());

        let newer = session
            .last_update_ts
            .map_or(true, |last| sample.recorded_at > last);
        if newer {
            session.current = Some(sample.clone());
            session.last_update_ts = Some(sample.recorded_at);
        }
        newer
    };

    state.metrics.tracking_samples_total.inc();

    if advanced {
        if let Some(feed) = state.track_feeds.get(&trip_id) {
            feed.send_replace(Some(sample.clone()));
        }
        state.emit(DomainEvent::LocationUpdated { trip_id, sample });
    }

    Ok(())
}

pub fn query(state: &AppState, trip_id: Uuid) -> Result<TrackingSnapshot, AppError> {
    let trip_status = state
        .trips
        .get(&trip_id)
        .map(|trip| trip.status)
        .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;

    let session = state
        .tracking
        .get(&trip_id)
        .ok_or_else(|| AppError::NotFound(format!("no tracking session for trip {trip_id}")))?;

    Ok(TrackingSnapshot {
        trip_id,
        trip_status,
        current: session.current.clone(),
        last_update_ts: session.last_update_ts,
        frozen: session.frozen,
    })
}

/// Full sample log, optionally windowed by recording time. Queryable even
/// after the session freezes.
pub fn history(
    state: &AppState,
    trip_id: Uuid,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<Vec<LocationSample>, AppError> {
    let session = state
        .tracking
        .get(&trip_id)
        .ok_or_else(|| AppError::NotFound(format!("no tracking session for trip {trip_id}")))?;

    Ok(session
        .history
        .iter()
        .filter(|sample| from.map_or(true, |f| sample.recorded_at >= f))
        .filter(|sample| to.map_or(true, |t| sample.recorded_at <= t))
        .cloned()
        .collect())
}

/// Advances the trip through its operational milestones. Completion or
/// cancellation freezes the tracking session and frees the driver and
/// vehicle for new commitments; history stays queryable.
pub fn mark_milestone(
    state: &AppState,
    trip_id: Uuid,
    kind: MilestoneKind,
) -> Result<Trip, AppError> {
    let trip = {
        let mut trip = state
            .trips
            .get_mut(&trip_id)
            .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;

        if trip.status.is_terminal() {
            return Err(AppError::TripTerminal(format!(
                "trip {trip_id} is already {:?}",
                trip.status
            )));
        }

        let next = match (trip.status, kind) {
            (TripStatus::Accepted, MilestoneKind::PickupReached) => TripStatus::AtPickup,
            (TripStatus::AtPickup, MilestoneKind::TripStarted) => TripStatus::InTransit,
            (TripStatus::InTransit, MilestoneKind::DropReached) => TripStatus::AtDrop,
            (TripStatus::AtDrop, MilestoneKind::Completed) => TripStatus::Completed,
            (_, MilestoneKind::Cancelled) => TripStatus::Cancelled,
            (current, requested) => {
                return Err(AppError::Validation(format!(
                    "milestone {requested:?} does not follow {current:?}"
                )));
            }
        };

        trip.status = next;
        trip.updated_at = state.clock.now();
        trip.clone()
    };

    if trip.status.is_terminal() {
        if let Some(mut session) = state.tracking.get_mut(&trip_id) {
            session.frozen = true;
        }
        coordinator::release_claims(
            state,
            trip.driver_assignment_id,
            trip.driver_id,
            trip.vehicle_id,
        );
    }

    info!(trip_id = %trip_id, status = ?trip.status, "trip milestone");

    Ok(trip)
}
