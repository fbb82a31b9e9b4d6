use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::broadcast::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TripStatus {
    Accepted,
    AtPickup,
    InTransit,
    AtDrop,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MilestoneKind {
    PickupReached,
    TripStarted,
    DropReached,
    Completed,
    Cancelled,
}

/// The operational record created once a DriverAssignment is accepted.
/// Created exactly once per DriverAssignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub driver_assignment_id: Uuid,
    pub assignment_id: Uuid,
    pub broadcast_id: Uuid,
    pub driver_id: Uuid,
    pub vehicle_id: Uuid,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub status: TripStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSample {
    pub lat: f64,
    pub lng: f64,
    pub speed_kmh: f64,
    pub heading_deg: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Live position state for one trip. `last_update_ts` is monotonic: an
/// out-of-order older sample lands in history but never regresses `current`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSession {
    pub trip_id: Uuid,
    pub current: Option<LocationSample>,
    pub last_update_ts: Option<DateTime<Utc>>,
    pub history: VecDeque<LocationSample>,
    pub frozen: bool,
}

impl TrackingSession {
    pub fn new(trip_id: Uuid) -> Self {
        Self {
            trip_id,
            current: None,
            last_update_ts: None,
            history: VecDeque::new(),
            frozen: false,
        }
    }
}
