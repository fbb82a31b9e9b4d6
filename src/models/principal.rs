use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    Customer,
    Transporter,
    Driver,
}

/// Validated identity handed to us by the upstream auth collaborator. The
/// engine trusts it and checks role and ownership once at the boundary:
/// the transporter on commit, the owning driver on respond.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn driver(id: Uuid) -> Self {
        Self {
            id,
            role: Role::Driver,
        }
    }

    pub fn transporter(id: Uuid) -> Self {
        Self {
            id,
            role: Role::Transporter,
        }
    }

    /// The acting principal must be the driver that owns the notification.
    pub fn require_driver(&self, driver_id: Uuid) -> Result<(), AppError> {
        if self.role != Role::Driver || self.id != driver_id {
            return Err(AppError::PrincipalMismatch(format!(
                "principal {} may not respond for driver {}",
                self.id, driver_id
            )));
        }
        Ok(())
    }

    /// Only a transporter may commit capacity against a broadcast.
    pub fn require_transporter(&self) -> Result<(), AppError> {
        if self.role != Role::Transporter {
            return Err(AppError::PrincipalMismatch(format!(
                "principal {} may not commit capacity",
                self.id
            )));
        }
        Ok(())
    }
}
