use serde::Serialize;
use uuid::Uuid;

use crate::models::assignment::AssignmentStatus;
use crate::models::broadcast::BroadcastStatus;
use crate::models::trip::LocationSample;

/// Events fanned out to dashboard/customer/transporter subscribers over the
/// event websocket. Serialized with a `type` tag matching the published
/// event names.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    #[serde(rename = "broadcast.updated")]
    BroadcastUpdated {
        broadcast_id: Uuid,
        status: BroadcastStatus,
        filled_count: u32,
        demand: u32,
    },

    #[serde(rename = "broadcast.expired")]
    BroadcastExpired {
        broadcast_id: Uuid,
        filled_count: u32,
        demand: u32,
    },

    #[serde(rename = "assignment.driverResponded")]
    DriverResponded {
        assignment_id: Uuid,
        driver_assignment_id: Uuid,
        driver_id: Uuid,
        accepted: bool,
        assignment_status: AssignmentStatus,
    },

    #[serde(rename = "assignment.reassignmentNeeded")]
    ReassignmentNeeded {
        broadcast_id: Uuid,
        assignment_id: Uuid,
        driver_assignment_id: Uuid,
        reason: String,
    },

    #[serde(rename = "tracking.locationUpdated")]
    LocationUpdated {
        trip_id: Uuid,
        sample: LocationSample,
    },
}
