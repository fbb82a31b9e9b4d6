//! Trait seams for collaborators this engine consumes but does not own:
//! vehicle/driver master data and the push/websocket/SMS providers.

use futures::future::BoxFuture;
use thiserror::Error;
use uuid::Uuid;

use crate::models::notification::{Channel, NotificationPayload};

pub trait AvailabilityLookup: Send + Sync {
    fn is_vehicle_available(&self, vehicle_id: Uuid) -> bool;
    fn is_driver_available(&self, driver_id: Uuid) -> bool;
}

/// Stand-in for the vehicle/driver master-data service: everything the
/// caller names is assumed to exist and be on duty.
pub struct MasterDataStub;

impl AvailabilityLookup for MasterDataStub {
    fn is_vehicle_available(&self, _vehicle_id: Uuid) -> bool {
        true
    }

    fn is_driver_available(&self, _driver_id: Uuid) -> bool {
        true
    }
}

#[derive(Debug, Error)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Abstract provider boundary for all delivery channels. Returns the
/// provider's delivery id on success. Boxed future so implementations stay
/// object-safe behind `Arc<dyn Notifier>`.
pub trait Notifier: Send + Sync {
    fn send(
        &self,
        channel: Channel,
        driver_id: Uuid,
        payload: NotificationPayload,
    ) -> BoxFuture<'static, Result<String, DeliveryError>>;
}

/// Default provider that only logs. Useful for local runs without real
/// push/SMS credentials.
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn send(
        &self,
        channel: Channel,
        driver_id: Uuid,
        payload: NotificationPayload,
    ) -> BoxFuture<'static, Result<String, DeliveryError>> {
        Box::pin(async move {
            tracing::debug!(
                ?channel,
                driver_id = %driver_id,
                broadcast_id = %payload.broadcast_id,
                "notification delivered (logging notifier)"
            );
            Ok(format!("log-{}", Uuid::new_v4()))
        })
    }
}
