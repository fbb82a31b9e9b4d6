use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssignmentStatus {
    PendingDriverResponse,
    PartiallyAccepted,
    FullyAccepted,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DriverAssignmentStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
    Reassigned,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DriverVehiclePair {
    pub driver_id: Uuid,
    pub vehicle_id: Uuid,
}

/// One vehicle+driver pairing within an Assignment, with its own
/// accept/decline lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverAssignment {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub vehicle_id: Uuid,
    pub status: DriverAssignmentStatus,
    pub decline_reason: Option<String>,
}

impl DriverAssignment {
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            DriverAssignmentStatus::Pending | DriverAssignmentStatus::Accepted
        )
    }
}

/// A transporter's commitment of trucks+drivers against a Broadcast.
/// Created atomically with its DriverAssignments; status recomputed as
/// children resolve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub broadcast_id: Uuid,
    pub transporter_id: Uuid,
    pub truck_count: u32,
    pub driver_assignments: Vec<DriverAssignment>,
    pub status: AssignmentStatus,
    pub created_at: DateTime<Utc>,
}

impl Assignment {
    /// Rollup over children: every child accepted means fully accepted, any
    /// accepted child means partially accepted, otherwise still pending.
    pub fn recompute_status(&mut self) {
        if self.status == AssignmentStatus::Cancelled {
            return;
        }

        let all_accepted = self
            .driver_assignments
            .iter()
            .all(|da| da.status == DriverAssignmentStatus::Accepted);
        let any_accepted = self
            .driver_assignments
            .iter()
            .any(|da| da.status == DriverAssignmentStatus::Accepted);

        self.status = if all_accepted {
            AssignmentStatus::FullyAccepted
        } else if any_accepted {
            AssignmentStatus::PartiallyAccepted
        } else {
            AssignmentStatus::PendingDriverResponse
        };
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{Assignment, AssignmentStatus, DriverAssignment, DriverAssignmentStatus};

    fn assignment(statuses: &[DriverAssignmentStatus]) -> Assignment {
        Assignment {
            id: Uuid::new_v4(),
            broadcast_id: Uuid::new_v4(),
            transporter_id: Uuid::new_v4(),
            truck_count: statuses.len() as u32,
            driver_assignments: statuses
                .iter()
                .map(|status| DriverAssignment {
                    id: Uuid::new_v4(),
                    driver_id: Uuid::new_v4(),
                    vehicle_id: Uuid::new_v4(),
                    status: *status,
                    decline_reason: None,
                })
                .collect(),
            status: AssignmentStatus::PendingDriverResponse,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn all_accepted_rolls_up_to_fully_accepted() {
        let mut a = assignment(&[
            DriverAssignmentStatus::Accepted,
            DriverAssignmentStatus::Accepted,
        ]);
        a.recompute_status();
        assert_eq!(a.status, AssignmentStatus::FullyAccepted);
    }

    #[test]
    fn mixed_responses_roll_up_to_partially_accepted() {
        let mut a = assignment(&[
            DriverAssignmentStatus::Accepted,
            DriverAssignmentStatus::Declined,
            DriverAssignmentStatus::Accepted,
        ]);
        a.recompute_status();
        assert_eq!(a.status, AssignmentStatus::PartiallyAccepted);
    }

    #[test]
    fn no_acceptances_stay_pending() {
        let mut a = assignment(&[
            DriverAssignmentStatus::Pending,
            DriverAssignmentStatus::Declined,
        ]);
        a.recompute_status();
        assert_eq!(a.status, AssignmentStatus::PendingDriverResponse);
    }

    #[test]
    fn cancelled_assignment_is_never_recomputed() {
        let mut a = assignment(&[DriverAssignmentStatus::Accepted]);
        a.status = AssignmentStatus::Cancelled;
        a.recompute_status();
        assert_eq!(a.status, AssignmentStatus::Cancelled);
    }
}
