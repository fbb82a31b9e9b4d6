use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::{coordinator, registry, response};
use crate::models::assignment::DriverAssignmentStatus;
use crate::models::broadcast::BroadcastStatus;
use crate::models::event::DomainEvent;
use crate::models::notification::{Notification, NotificationStatus};
use crate::state::AppState;

#[derive(Debug, Default)]
pub struct SweepReport {
    pub notifications_expired: usize,
    pub broadcasts_expired: usize,
}

/// Periodic sweep loop. Every mutation inside `sweep` is a status-guarded
/// conditional update, so running several instances of this loop at once
/// just makes the extra sweeps no-ops.
pub async fn run_expiry_scheduler(state: Arc<AppState>, period: Duration) {
    info!(period_secs = period.as_secs(), "expiry scheduler started");

    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        let report = sweep(&state);
        if report.notifications_expired > 0 || report.broadcasts_expired > 0 {
            info!(
                notifications = report.notifications_expired,
                broadcasts = report.broadcasts_expired,
                "expiry sweep"
            );
        }
    }
}

/// One pass over lapsed notifications and broadcasts, using the injected
/// clock so tests drive time explicitly.
pub fn sweep(state: &AppState) -> SweepReport {
    let now = state.clock.now();
    let mut report = SweepReport::default();

    let lapsed_notifications: Vec<Uuid> = state
        .notifications
        .iter()
        .filter(|entry| {
            entry.status == NotificationStatus::PendingResponse && entry.expiry <= now
        })
        .map(|entry| entry.id)
        .collect();

    for id in lapsed_notifications {
        if expire_notification(state, id) {
            report.notifications_expired += 1;
        }
    }

    let lapsed_broadcasts: Vec<Uuid> = state
        .broadcasts
        .iter()
        .filter(|entry| {
            entry.accepts_commitments() && entry.expiry <= now && entry.filled_count < entry.demand
        })
        .map(|entry| entry.id)
        .collect();

    for id in lapsed_broadcasts {
        if expire_broadcast(state, id) {
            report.broadcasts_expired += 1;
        }
    }

    report
}

/// Transitions one lapsed notification to Expired and cascades to its
/// driver assignment. Returns false when another writer got there first.
pub fn expire_notification(state: &AppState, notification_id: Uuid) -> bool {
    let now = state.clock.now();

    let snapshot = {
        let mut notification = match state.notifications.get_mut(&notification_id) {
            Some(entry) => entry,
            None => return false,
        };

        if notification.status != NotificationStatus::PendingResponse || notification.expiry > now {
            return false;
        }

        notification.status = NotificationStatus::Expired;
        notification.clone()
    };

    expire_cascade(state, &snapshot);
    true
}

/// Cascade shared by the sweep and the eager expiry path in the response
/// processor: expire the driver assignment, free its claims, return the
/// slot, and ask the transporter for a replacement.
pub(crate) fn expire_cascade(state: &AppState, notification: &Notification) {
    let resolved = response::resolve_driver_assignment(
        state,
        notification.assignment_id,
        notification.driver_assignment_id,
        DriverAssignmentStatus::Expired,
        None,
    );

    let (assignment, da) = match resolved {
        Ok(pair) => pair,
        Err(err) => {
            // Already resolved by a racing writer; the guarded child
            // transition makes this sweep a no-op.
            warn!(
                notification_id = %notification.id,
                error = %err,
                "expiry cascade skipped"
            );
            return;
        }
    };

    coordinator::release_claims(state, da.id, da.driver_id, da.vehicle_id);
    registry::release_slot(state, assignment.broadcast_id);

    state
        .metrics
        .driver_responses_total
        .with_label_values(&["expired"])
        .inc();
    state.emit(DomainEvent::ReassignmentNeeded {
        broadcast_id: assignment.broadcast_id,
        assignment_id: assignment.id,
        driver_assignment_id: da.id,
        reason: "notification expired".to_string(),
    });

    info!(
        notification_id = %notification.id,
        driver_id = %da.driver_id,
        "notification expired"
    );
}

fn expire_broadcast(state: &AppState, broadcast_id: Uuid) -> bool {
    let now = state.clock.now();

    let snapshot = {
        let mut broadcast = match state.broadcasts.get_mut(&broadcast_id) {
            Some(entry) => entry,
            None => return false,
        };

        if !broadcast.accepts_commitments()
            || broadcast.expiry > now
            || broadcast.filled_count >= broadcast.demand
        {
            return false;
        }

        broadcast.status = BroadcastStatus::Expired;
        broadcast.clone()
    };

    state.emit(DomainEvent::BroadcastExpired {
        broadcast_id: snapshot.id,
        filled_count: snapshot.filled_count,
        demand: snapshot.demand,
    });

    info!(
        broadcast_id = %broadcast_id,
        filled = snapshot.filled_count,
        demand = snapshot.demand,
        "broadcast expired with partial fulfillment"
    );

    true
}
