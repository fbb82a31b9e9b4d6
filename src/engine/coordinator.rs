use std::collections::HashSet;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::dispatcher::NotificationJob;
use crate::error::AppError;
use crate::models::assignment::{
    Assignment, AssignmentStatus, DriverAssignment, DriverAssignmentStatus, DriverVehiclePair,
};
use crate::models::broadcast::BroadcastStatus;
use crate::models::notification::NotificationPayload;
use crate::models::principal::Principal;
use crate::state::AppState;

pub struct CommitRequest {
    pub principal: Principal,
    pub truck_count: u32,
    pub pairs: Vec<DriverVehiclePair>,
}

/// Commits a transporter's capacity against a broadcast. All-or-nothing:
/// either every driver/vehicle pair is claimed and `filled_count` moves, or
/// nothing changes. The broadcast entry guard is held across the capacity
/// check-and-increment, so concurrent commits on the same broadcast
/// serialize while other broadcasts proceed in parallel.
pub fn commit(
    state: &AppState,
    broadcast_id: Uuid,
    req: CommitRequest,
) -> Result<Assignment, AppError> {
    let start = Instant::now();
    let result = commit_inner(state, broadcast_id, req);

    let outcome = if result.is_ok() { "success" } else { "error" };
    state
        .metrics
        .commit_latency_seconds
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());
    state
        .metrics
        .commits_total
        .with_label_values(&[outcome])
        .inc();

    result
}

fn commit_inner(
    state: &AppState,
    broadcast_id: Uuid,
    req: CommitRequest,
) -> Result<Assignment, AppError> {
    req.principal.require_transporter()?;

    if req.truck_count == 0 {
        return Err(AppError::Validation("truck_count must be > 0".to_string()));
    }
    if req.pairs.len() != req.truck_count as usize {
        return Err(AppError::Validation(format!(
            "expected {} driver/vehicle pairs, got {}",
            req.truck_count,
            req.pairs.len()
        )));
    }

    let mut seen_drivers = HashSet::new();
    let mut seen_vehicles = HashSet::new();
    for pair in &req.pairs {
        if !seen_drivers.insert(pair.driver_id) || !seen_vehicles.insert(pair.vehicle_id) {
            return Err(AppError::Validation(
                "duplicate driver or vehicle in commit".to_string(),
            ));
        }
    }

    // Master-data availability is a precondition, checked before entering
    // the critical section; active-assignment uniqueness is checked inside.
    for pair in &req.pairs {
        if !state.availability.is_driver_available(pair.driver_id) {
            return Err(AppError::Unavailable(format!(
                "driver {} is not available",
                pair.driver_id
            )));
        }
        if !state.availability.is_vehicle_available(pair.vehicle_id) {
            return Err(AppError::Unavailable(format!(
                "vehicle {} is not available",
                pair.vehicle_id
            )));
        }
    }

    let now = state.clock.now();
    let assignment_id = Uuid::new_v4();

    let driver_assignments: Vec<DriverAssignment> = req
        .pairs
        .iter()
        .map(|pair| DriverAssignment {
            id: Uuid::new_v4(),
            driver_id: pair.driver_id,
            vehicle_id: pair.vehicle_id,
            status: DriverAssignmentStatus::Pending,
            decline_reason: None,
        })
        .collect();

    let broadcast_snapshot = {
        let mut broadcast = state
            .broadcasts
            .get_mut(&broadcast_id)
            .ok_or_else(|| AppError::NotFound(format!("broadcast {broadcast_id} not found")))?;

        match broadcast.status {
            BroadcastStatus::Active | BroadcastStatus::PartiallyFilled => {}
            BroadcastStatus::FullyFilled => {
                return Err(AppError::CapacityExceeded(format!(
                    "broadcast {broadcast_id} is fully filled"
                )));
            }
            BroadcastStatus::Expired | BroadcastStatus::Cancelled => {
                return Err(AppError::Expired(format!(
                    "broadcast {broadcast_id} is no longer open"
                )));
            }
        }

        // The sweep may not have run yet; a lapsed broadcast still rejects.
        if broadcast.expiry <= now {
            return Err(AppError::Expired(format!(
                "broadcast {broadcast_id} lapsed at {}",
                broadcast.expiry
            )));
        }

        if req.truck_count > broadcast.remaining() {
            return Err(AppError::CapacityExceeded(format!(
                "requested {} trucks, {} remaining",
                req.truck_count,
                broadcast.remaining()
            )));
        }

        claim_pairs(state, &driver_assignments)?;

        broadcast.filled_count += req.truck_count;
        broadcast.status = if broadcast.filled_count == broadcast.demand {
            BroadcastStatus::FullyFilled
        } else {
            BroadcastStatus::PartiallyFilled
        };
        broadcast.clone()
    };

    let assignment = Assignment {
        id: assignment_id,
        broadcast_id,
        transporter_id: req.principal.id,
        truck_count: req.truck_count,
        driver_assignments,
        status: AssignmentStatus::PendingDriverResponse,
        created_at: now,
    };

    state.assignments.insert(assignment.id, assignment.clone());
    crate::engine::registry::emit_updated(state, &broadcast_snapshot);

    // Notification fan-out is best-effort and outside the capacity
    // transaction; a full queue never unwinds the commit.
    let payload = NotificationPayload {
        broadcast_id,
        pickup: broadcast_snapshot.route.origin,
        dropoff: broadcast_snapshot.route.destination,
        vehicle_type: broadcast_snapshot.vehicle_type.clone(),
        fare_amount: broadcast_snapshot.fare.amount,
    };

    for da in &assignment.driver_assignments {
        let job = NotificationJob {
            driver_assignment_id: da.id,
            assignment_id: assignment.id,
            driver_id: da.driver_id,
            payload: payload.clone(),
        };
        if let Err(err) = state.notification_tx.try_send(job) {
            warn!(
                driver_assignment_id = %da.id,
                error = %err,
                "notification queue full; driver must be re-notified"
            );
        }
    }

    info!(
        broadcast_id = %broadcast_id,
        assignment_id = %assignment.id,
        transporter_id = %req.principal.id,
        truck_count = req.truck_count,
        filled = broadcast_snapshot.filled_count,
        "capacity committed"
    );

    Ok(assignment)
}

/// Claims every driver and vehicle atomically per key, rolling back on the
/// first conflict so a rejected commit leaves no claims behind.
fn claim_pairs(state: &AppState, driver_assignments: &[DriverAssignment]) -> Result<(), AppError> {
    let mut claimed: Vec<(&DashMap<Uuid, Uuid>, Uuid)> = Vec::new();

    for da in driver_assignments {
        if !try_claim(&state.active_drivers, da.driver_id, da.id) {
            rollback(&claimed);
            return Err(AppError::Unavailable(format!(
                "driver {} already has an active assignment",
                da.driver_id
            )));
        }
        claimed.push((&state.active_drivers, da.driver_id));

        if !try_claim(&state.active_vehicles, da.vehicle_id, da.id) {
            rollback(&claimed);
            return Err(AppError::Unavailable(format!(
                "vehicle {} already has an active assignment",
                da.vehicle_id
            )));
        }
        claimed.push((&state.active_vehicles, da.vehicle_id));
    }

    Ok(())
}

fn try_claim(index: &DashMap<Uuid, Uuid>, key: Uuid, driver_assignment_id: Uuid) -> bool {
    match index.entry(key) {
        Entry::Occupied(_) => false,
        Entry::Vacant(slot) => {
            slot.insert(driver_assignment_id);
            true
        }
    }
}

fn rollback(claimed: &[(&DashMap<Uuid, Uuid>, Uuid)]) {
    for (index, key) in claimed {
        index.remove(key);
    }
}

/// Releases both claims held by a driver assignment. Conditional on the
/// claim still belonging to that assignment, so a later commit's claim is
/// never clobbered.
pub(crate) fn release_claims(
    state: &AppState,
    driver_assignment_id: Uuid,
    driver_id: Uuid,
    vehicle_id: Uuid,
) {
    state
        .active_drivers
        .remove_if(&driver_id, |_, held_by| *held_by == driver_assignment_id);
    state
        .active_vehicles
        .remove_if(&vehicle_id, |_, held_by| *held_by == driver_assignment_id);
}
