use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::broadcast::{Broadcast, BroadcastStatus, FareTerms, Route};
use crate::models::event::DomainEvent;
use crate::state::AppState;

pub struct CreateBroadcast {
    pub demand: u32,
    pub vehicle_type: String,
    pub route: Route,
    pub fare: FareTerms,
    pub expiry: DateTime<Utc>,
}

pub fn create(state: &AppState, req: CreateBroadcast) -> Result<Broadcast, AppError> {
    if req.demand == 0 {
        return Err(AppError::Validation("demand must be > 0".to_string()));
    }

    let now = state.clock.now();
    if req.expiry <= now {
        return Err(AppError::Validation(
            "expiry must be in the future".to_string(),
        ));
    }

    let broadcast = Broadcast {
        id: Uuid::new_v4(),
        demand: req.demand,
        filled_count: 0,
        vehicle_type: req.vehicle_type,
        route: req.route,
        fare: req.fare,
        status: BroadcastStatus::Active,
        created_at: now,
        expiry: req.expiry,
    };

    state.broadcasts.insert(broadcast.id, broadcast.clone());
    info!(broadcast_id = %broadcast.id, demand = broadcast.demand, "broadcast registered");

    Ok(broadcast)
}

pub fn query(state: &AppState, id: Uuid) -> Result<Broadcast, AppError> {
    state
        .broadcasts
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("broadcast {id} not found")))
}

/// Status-guarded cancellation; only a broadcast still taking commitments
/// can be cancelled.
pub fn cancel(state: &AppState, id: Uuid) -> Result<Broadcast, AppError> {
    let snapshot = {
        let mut broadcast = state
            .broadcasts
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("broadcast {id} not found")))?;

        if !broadcast.accepts_commitments() {
            return Err(AppError::Expired(format!(
                "broadcast {id} is no longer active"
            )));
        }

        broadcast.status = BroadcastStatus::Cancelled;
        broadcast.clone()
    };

    info!(broadcast_id = %id, "broadcast cancelled");
    emit_updated(state, &snapshot);

    Ok(snapshot)
}

/// Returns one committed slot to the pool after a decline or expiry. A
/// no-op unless the broadcast is still in a filled state, so sweeps and
/// responses racing each other cannot double-release.
pub(crate) fn release_slot(state: &AppState, broadcast_id: Uuid) {
    let snapshot = {
        let mut broadcast = match state.broadcasts.get_mut(&broadcast_id) {
            Some(entry) => entry,
            None => return,
        };

        if !matches!(
            broadcast.status,
            BroadcastStatus::PartiallyFilled | BroadcastStatus::FullyFilled
        ) {
            return;
        }

        broadcast.filled_count = broadcast.filled_count.saturating_sub(1);
        broadcast.status = if broadcast.filled_count == 0 {
            BroadcastStatus::Active
        } else {
            BroadcastStatus::PartiallyFilled
        };
        broadcast.clone()
    };

    emit_updated(state, &snapshot);
}

pub(crate) fn emit_updated(state: &AppState, broadcast: &Broadcast) {
    state
        .metrics
        .broadcast_fill_ratio
        .with_label_values(&[&broadcast.id.to_string()])
        .set(broadcast.filled_count as f64 / broadcast.demand as f64);

    state.emit(DomainEvent::BroadcastUpdated {
        broadcast_id: broadcast.id,
        status: broadcast.status,
        filled_count: broadcast.filled_count,
        demand: broadcast.demand,
    });
}
