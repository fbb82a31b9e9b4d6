use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, watch};
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::engine::clock::{Clock, SystemClock};
use crate::engine::dispatcher::NotificationJob;
use crate::external::{AvailabilityLookup, LoggingNotifier, MasterDataStub, Notifier};
use crate::models::assignment::Assignment;
use crate::models::broadcast::Broadcast;
use crate::models::event::DomainEvent;
use crate::models::notification::Notification;
use crate::models::trip::{LocationSample, TrackingSession, Trip};
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub broadcasts: DashMap<Uuid, Broadcast>,
    pub assignments: DashMap<Uuid, Assignment>,
    pub notifications: DashMap<Uuid, Notification>,
    pub trips: DashMap<Uuid, Trip>,
    pub tracking: DashMap<Uuid, TrackingSession>,

    /// driver_assignment_id -> notification_id; guarantees one notification
    /// per driver assignment.
    pub notification_index: DashMap<Uuid, Uuid>,

    /// Claim indexes enforcing the no-double-booking invariant: key is the
    /// driver/vehicle id, value the driver assignment currently holding it.
    pub active_drivers: DashMap<Uuid, Uuid>,
    pub active_vehicles: DashMap<Uuid, Uuid>,

    /// Drivers with a live websocket registration, consulted by the
    /// delivery fallback policy.
    pub connected_drivers: DashMap<Uuid, ()>,

    /// Per-trip latest-location feeds. `watch` keeps at most one pending
    /// update per subscriber, so a slow consumer never blocks ingest.
    pub track_feeds: DashMap<Uuid, watch::Sender<Option<LocationSample>>>,

    pub notification_tx: mpsc::Sender<NotificationJob>,
    pub events_tx: broadcast::Sender<DomainEvent>,

    pub availability: Arc<dyn AvailabilityLookup>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,

    pub settings: EngineSettings,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        settings: EngineSettings,
        notification_queue_size: usize,
        event_buffer_size: usize,
    ) -> (Self, mpsc::Receiver<NotificationJob>) {
        let (notification_tx, notification_rx) = mpsc::channel(notification_queue_size);
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        (
            Self {
                broadcasts: DashMap::new(),
                assignments: DashMap::new(),
                notifications: DashMap::new(),
                trips: DashMap::new(),
                tracking: DashMap::new(),
                notification_index: DashMap::new(),
                active_drivers: DashMap::new(),
                active_vehicles: DashMap::new(),
                connected_drivers: DashMap::new(),
                track_feeds: DashMap::new(),
                notification_tx,
                events_tx,
                availability: Arc::new(MasterDataStub),
                notifier: Arc::new(LoggingNotifier),
                clock: Arc::new(SystemClock),
                settings,
                metrics: Metrics::new(),
            },
            notification_rx,
        )
    }

    pub fn emit(&self, event: DomainEvent) {
        // Nobody listening is fine; dashboards come and go.
        let _ = self.events_tx.send(event);
    }
}
