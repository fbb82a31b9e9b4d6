use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use crate::engine::{coordinator, expiry, registry, tracking};
use crate::error::AppError;
use crate::models::assignment::{Assignment, DriverAssignment, DriverAssignmentStatus};
use crate::models::broadcast::GeoPoint;
use crate::models::event::DomainEvent;
use crate::models::notification::{Notification, NotificationStatus};
use crate::models::principal::Principal;
use crate::models::trip::{LocationSample, TrackingSession, Trip, TripStatus};
use crate::state::AppState;

/// Accepts a pending notification on behalf of its driver. Idempotent under
/// retries: the status swap happens under the notification entry guard, so
/// a duplicate call observes the resolved state and gets
/// `AlreadyResponded` with no further mutation. Exactly one Trip exists per
/// accepted driver assignment.
pub fn accept(
    state: &AppState,
    notification_id: Uuid,
    principal: Principal,
    location: GeoPoint,
) -> Result<Trip, AppError> {
    let notification = swap_status(state, notification_id, principal, NotificationStatus::Accepted)?;

    let (assignment, da) = resolve_driver_assignment(
        state,
        notification.assignment_id,
        notification.driver_assignment_id,
        DriverAssignmentStatus::Accepted,
        None,
    )?;

    let now = state.clock.now();
    let trip = Trip {
        id: Uuid::new_v4(),
        driver_assignment_id: da.id,
        assignment_id: assignment.id,
        broadcast_id: assignment.broadcast_id,
        driver_id: da.driver_id,
        vehicle_id: da.vehicle_id,
        pickup: notification.payload.pickup,
        dropoff: notification.payload.dropoff,
        status: TripStatus::Accepted,
        created_at: now,
        updated_at: now,
    };

    state.trips.insert(trip.id, trip.clone());
    state.tracking.insert(trip.id, TrackingSession::new(trip.id));
    let (feed, _unused_rx) = watch::channel(None);
    state.track_feeds.insert(trip.id, feed);

    // The driver's position at acceptance seeds the session.
    tracking::ingest(
        state,
        trip.id,
        LocationSample {
            lat: location.lat,
            lng: location.lng,
            speed_kmh: 0.0,
            heading_deg: 0.0,
            recorded_at: now,
        },
    )?;

    state
        .metrics
        .driver_responses_total
        .with_label_values(&["accept"])
        .inc();
    state.emit(DomainEvent::DriverResponded {
        assignment_id: assignment.id,
        driver_assignment_id: da.id,
        driver_id: da.driver_id,
        accepted: true,
        assignment_status: assignment.status,
    });

    info!(
        notification_id = %notification_id,
        trip_id = %trip.id,
        driver_id = %da.driver_id,
        "driver accepted"
    );

    Ok(trip)
}

/// Declines a pending notification. Releases the driver's and vehicle's
/// claims and returns the slot to the broadcast; picking a replacement is
/// the transporter's manual follow-up commit.
pub fn decline(
    state: &AppState,
    notification_id: Uuid,
    principal: Principal,
    reason: Option<String>,
) -> Result<Assignment, AppError> {
    let notification = swap_status(state, notification_id, principal, NotificationStatus::Declined)?;

    let (assignment, da) = resolve_driver_assignment(
        state,
        notification.assignment_id,
        notification.driver_assignment_id,
        DriverAssignmentStatus::Declined,
        reason.clone(),
    )?;

    coordinator::release_claims(state, da.id, da.driver_id, da.vehicle_id);
    registry::release_slot(state, assignment.broadcast_id);

    state
        .metrics
        .driver_responses_total
        .with_label_values(&["decline"])
        .inc();
    state.emit(DomainEvent::DriverResponded {
        assignment_id: assignment.id,
        driver_assignment_id: da.id,
        driver_id: da.driver_id,
        accepted: false,
        assignment_status: assignment.status,
    });
    state.emit(DomainEvent::ReassignmentNeeded {
        broadcast_id: assignment.broadcast_id,
        assignment_id: assignment.id,
        driver_assignment_id: da.id,
        reason: reason.unwrap_or_else(|| "driver declined".to_string()),
    });

    info!(
        notification_id = %notification_id,
        driver_id = %da.driver_id,
        "driver declined"
    );

    Ok(assignment)
}

/// The compare-and-swap at the heart of accept/decline: holds the
/// notification entry guard, checks ownership and expiry, and flips
/// PendingResponse to the target status. A lapsed notification is surfaced
/// as Expired right here instead of waiting for the next sweep.
fn swap_status(
    state: &AppState,
    notification_id: Uuid,
    principal: Principal,
    target: NotificationStatus,
) -> Result<Notification, AppError> {
    let now = state.clock.now();

    let (snapshot, lapsed) = {
        let mut notification = state
            .notifications
            .get_mut(&notification_id)
            .ok_or_else(|| AppError::NotFound(format!("notification {notification_id} not found")))?;

        match notification.status {
            NotificationStatus::Accepted | NotificationStatus::Declined => {
                return Err(AppError::AlreadyResponded(format!(
                    "notification {notification_id} was already resolved"
                )));
            }
            NotificationStatus::Expired => {
                return Err(AppError::Expired(format!(
                    "notification {notification_id} has expired"
                )));
            }
            NotificationStatus::PendingResponse => {}
        }

        principal.require_driver(notification.driver_id)?;

        if notification.expiry <= now {
            notification.status = NotificationStatus::Expired;
            (notification.clone(), true)
        } else {
            notification.status = target;
            notification.responded_at = Some(now);
            (notification.clone(), false)
        }
    };

    if lapsed {
        expiry::expire_cascade(state, &snapshot);
        return Err(AppError::Expired(format!(
            "notification {notification_id} expired at {}",
            snapshot.expiry
        )));
    }

    Ok(snapshot)
}

/// Applies the driver's resolution to the owning assignment and recomputes
/// the parent rollup. Guarded: only a Pending child can move.
pub(crate) fn resolve_driver_assignment(
    state: &AppState,
    assignment_id: Uuid,
    driver_assignment_id: Uuid,
    new_status: DriverAssignmentStatus,
    decline_reason: Option<String>,
) -> Result<(Assignment, DriverAssignment), AppError> {
    let mut assignment = state
        .assignments
        .get_mut(&assignment_id)
        .ok_or_else(|| AppError::Internal(format!("assignment {assignment_id} missing")))?;

    let da = assignment
        .driver_assignments
        .iter_mut()
        .find(|da| da.id == driver_assignment_id)
        .ok_or_else(|| {
            AppError::Internal(format!(
                "driver assignment {driver_assignment_id} missing from {assignment_id}"
            ))
        })?;

    if da.status != DriverAssignmentStatus::Pending {
        return Err(AppError::AlreadyResponded(format!(
            "driver assignment {driver_assignment_id} was already resolved"
        )));
    }

    da.status = new_status;
    da.decline_reason = decline_reason;
    let da_snapshot = da.clone();

    assignment.recompute_status();

    Ok((assignment.clone(), da_snapshot))
}
