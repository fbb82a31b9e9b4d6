use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::broadcast::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Channel {
    Push,
    Websocket,
    Sms,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeliveryOutcome {
    Delivered { delivery_id: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub channel: Channel,
    pub attempt: u32,
    pub at: DateTime<Utc>,
    pub outcome: DeliveryOutcome,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotificationStatus {
    PendingResponse,
    Accepted,
    Declined,
    Expired,
}

/// What the driver sees: where the job starts and ends and what it pays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub broadcast_id: Uuid,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub vehicle_type: String,
    pub fare_amount: f64,
}

/// The record and delivery attempts informing one driver of one
/// DriverAssignment. Exactly one exists per DriverAssignment; its terminal
/// state is set by the response processor or the expiry sweep, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub driver_assignment_id: Uuid,
    pub assignment_id: Uuid,
    pub driver_id: Uuid,
    pub payload: NotificationPayload,
    pub status: NotificationStatus,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
    pub deliveries: Vec<DeliveryAttempt>,
    pub created_at: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
}
