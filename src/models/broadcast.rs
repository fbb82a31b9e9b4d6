use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub origin: GeoPoint,
    pub destination: GeoPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FareTerms {
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BroadcastStatus {
    Active,
    PartiallyFilled,
    FullyFilled,
    Expired,
    Cancelled,
}

/// A customer's posted demand for `demand` trucks on a route.
///
/// `filled_count <= demand` holds for every observer; the only writers are
/// the commit critical section and the expiry sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Broadcast {
    pub id: Uuid,
    pub demand: u32,
    pub filled_count: u32,
    pub vehicle_type: String,
    pub route: Route,
    pub fare: FareTerms,
    pub status: BroadcastStatus,
    pub created_at: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
}

impl Broadcast {
    pub fn remaining(&self) -> u32 {
        self.demand.saturating_sub(self.filled_count)
    }

    pub fn accepts_commitments(&self) -> bool {
        matches!(
            self.status,
            BroadcastStatus::Active | BroadcastStatus::PartiallyFilled
        )
    }
}
