use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::future::BoxFuture;
use uuid::Uuid;

use freight_dispatch::config::EngineSettings;
use freight_dispatch::engine::clock::ManualClock;
use freight_dispatch::engine::coordinator::{self, CommitRequest};
use freight_dispatch::engine::dispatcher::{self, NotificationJob};
use freight_dispatch::engine::registry::{self, CreateBroadcast};
use freight_dispatch::engine::{expiry, response, tracking};
use freight_dispatch::error::AppError;
use freight_dispatch::external::{DeliveryError, Notifier};
use freight_dispatch::models::assignment::{
    Assignment, AssignmentStatus, DriverAssignmentStatus, DriverVehiclePair,
};
use freight_dispatch::models::broadcast::{
    Broadcast, BroadcastStatus, FareTerms, GeoPoint, Route,
};
use freight_dispatch::models::notification::{
    Channel, DeliveryOutcome, Notification, NotificationPayload, NotificationStatus,
};
use freight_dispatch::models::principal::Principal;
use freight_dispatch::models::trip::{LocationSample, MilestoneKind, Trip};
use freight_dispatch::state::AppState;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

fn test_state() -> (Arc<AppState>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(base_time()));
    let settings = EngineSettings {
        delivery_backoff_ms: 0,
        sms_fallback_secs: 0,
        ..EngineSettings::default()
    };
    let (mut state, _rx) = AppState::new(settings, 64, 64);
    state.clock = clock.clone();
    (Arc::new(state), clock)
}

fn make_broadcast(state: &AppState, demand: u32, open_for_secs: i64) -> Broadcast {
    registry::create(
        state,
        CreateBroadcast {
            demand,
            vehicle_type: "32ft-truck".to_string(),
            route: Route {
                origin: GeoPoint {
                    lat: 28.6139,
                    lng: 77.2090,
                },
                destination: GeoPoint {
                    lat: 26.9124,
                    lng: 75.7873,
                },
            },
            fare: FareTerms {
                amount: 18_000.0,
                currency: "INR".to_string(),
            },
            expiry: state.clock.now() + Duration::seconds(open_for_secs),
        },
    )
    .expect("broadcast created")
}

fn pairs(n: usize) -> Vec<DriverVehiclePair> {
    (0..n)
        .map(|_| DriverVehiclePair {
            driver_id: Uuid::new_v4(),
            vehicle_id: Uuid::new_v4(),
        })
        .collect()
}

fn commit_pairs(
    state: &AppState,
    broadcast_id: Uuid,
    pairs: Vec<DriverVehiclePair>,
) -> Result<Assignment, AppError> {
    coordinator::commit(
        state,
        broadcast_id,
        CommitRequest {
            principal: Principal::transporter(Uuid::new_v4()),
            truck_count: pairs.len() as u32,
            pairs,
        },
    )
}

fn notify(state: &AppState, broadcast: &Broadcast, assignment: &Assignment, idx: usize) -> Notification {
    let da = &assignment.driver_assignments[idx];
    dispatcher::create(
        state,
        NotificationJob {
            driver_assignment_id: da.id,
            assignment_id: assignment.id,
            driver_id: da.driver_id,
            payload: NotificationPayload {
                broadcast_id: broadcast.id,
                pickup: broadcast.route.origin,
                dropoff: broadcast.route.destination,
                vehicle_type: broadcast.vehicle_type.clone(),
                fare_amount: broadcast.fare.amount,
            },
        },
        None,
    )
    .expect("notification created")
}

fn accept(state: &AppState, notification: &Notification) -> Result<Trip, AppError> {
    response::accept(
        state,
        notification.id,
        Principal::driver(notification.driver_id),
        GeoPoint {
            lat: 28.61,
            lng: 77.21,
        },
    )
}

fn sample(at: DateTime<Utc>, lat: f64) -> LocationSample {
    LocationSample {
        lat,
        lng: 77.0,
        speed_kmh: 48.0,
        heading_deg: 180.0,
        recorded_at: at,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_commits_never_exceed_demand() {
    let (state, _clock) = test_state();
    let broadcast = make_broadcast(&state, 10, 3600);

    commit_pairs(&state, broadcast.id, pairs(7)).expect("initial fill");

    // Two racing commits of 2 trucks each against 3 remaining slots: only
    // one fits, and it must be all-or-nothing for both.
    let barrier = Arc::new(tokio::sync::Barrier::new(2));
    let mut handles = Vec::new();
    for _ in 0..2 {
        let state = state.clone();
        let barrier = barrier.clone();
        let id = broadcast.id;
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            commit_pairs(&state, id, pairs(2))
        }));
    }

    let mut ok = 0;
    for handle in handles {
        if handle.await.expect("task").is_ok() {
            ok += 1;
        }
    }

    let snapshot = registry::query(&state, broadcast.id).expect("broadcast");
    assert!(snapshot.filled_count <= snapshot.demand);
    assert_eq!(ok, 1);
    assert_eq!(snapshot.filled_count, 9);

    // A four-truck ask against the single remaining slot is rejected whole,
    // then a right-sized retry lands.
    let err = commit_pairs(&state, broadcast.id, pairs(4)).unwrap_err();
    assert!(matches!(err, AppError::CapacityExceeded(_)));

    commit_pairs(&state, broadcast.id, pairs(1)).expect("final slot");
    let snapshot = registry::query(&state, broadcast.id).expect("broadcast");
    assert_eq!(snapshot.status, BroadcastStatus::FullyFilled);
    assert_eq!(snapshot.filled_count, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn commit_stampede_fills_exactly_to_demand() {
    let (state, _clock) = test_state();
    let broadcast = make_broadcast(&state, 5, 3600);

    let barrier = Arc::new(tokio::sync::Barrier::new(20));
    let mut handles = Vec::new();
    for _ in 0..20 {
        let state = state.clone();
        let barrier = barrier.clone();
        let id = broadcast.id;
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            commit_pairs(&state, id, pairs(1))
        }));
    }

    let mut ok = 0;
    for handle in handles {
        if handle.await.expect("task").is_ok() {
            ok += 1;
        }
    }

    assert_eq!(ok, 5);
    let snapshot = registry::query(&state, broadcast.id).expect("broadcast");
    assert_eq!(snapshot.filled_count, 5);
    assert_eq!(snapshot.status, BroadcastStatus::FullyFilled);
}

#[tokio::test]
async fn driver_cannot_hold_two_active_assignments() {
    let (state, _clock) = test_state();
    let first = make_broadcast(&state, 2, 3600);
    let second = make_broadcast(&state, 2, 3600);

    let shared = pairs(1);
    commit_pairs(&state, first.id, shared.clone()).expect("first commit");

    let err = commit_pairs(&state, second.id, shared).unwrap_err();
    assert!(matches!(err, AppError::Unavailable(_)));

    // The rejected commit must leave no claims or fill behind.
    let snapshot = registry::query(&state, second.id).expect("broadcast");
    assert_eq!(snapshot.filled_count, 0);
    assert_eq!(snapshot.status, BroadcastStatus::Active);
}

#[tokio::test]
async fn rejected_commit_applies_nothing() {
    let (state, _clock) = test_state();
    let broadcast = make_broadcast(&state, 3, 3600);

    let mut mixed = pairs(2);
    commit_pairs(&state, broadcast.id, vec![mixed[1]]).expect("claim second pair");

    // First pair is free, second is taken: the whole commit must fail and
    // the free pair must stay claimable.
    let err = commit_pairs(&state, broadcast.id, mixed.clone()).unwrap_err();
    assert!(matches!(err, AppError::Unavailable(_)));

    let snapshot = registry::query(&state, broadcast.id).expect("broadcast");
    assert_eq!(snapshot.filled_count, 1);

    let free = mixed.remove(0);
    commit_pairs(&state, broadcast.id, vec![free]).expect("free pair still claimable");
}

#[tokio::test]
async fn accept_is_idempotent_and_creates_one_trip() {
    let (state, _clock) = test_state();
    let broadcast = make_broadcast(&state, 1, 3600);
    let assignment = commit_pairs(&state, broadcast.id, pairs(1)).expect("commit");
    let notification = notify(&state, &broadcast, &assignment, 0);

    let trip = accept(&state, &notification).expect("first accept");

    let err = accept(&state, &notification).unwrap_err();
    assert!(matches!(err, AppError::AlreadyResponded(_)));

    assert_eq!(state.trips.len(), 1);
    let stored = state.trips.get(&trip.id).expect("trip stored");
    assert_eq!(stored.driver_assignment_id, assignment.driver_assignments[0].id);

    let resolved = state.assignments.get(&assignment.id).expect("assignment");
    assert_eq!(resolved.status, AssignmentStatus::FullyAccepted);
}

#[tokio::test]
async fn accept_rejects_the_wrong_driver() {
    let (state, _clock) = test_state();
    let broadcast = make_broadcast(&state, 1, 3600);
    let assignment = commit_pairs(&state, broadcast.id, pairs(1)).expect("commit");
    let notification = notify(&state, &broadcast, &assignment, 0);

    let err = response::accept(
        &state,
        notification.id,
        Principal::driver(Uuid::new_v4()),
        GeoPoint { lat: 0.0, lng: 0.0 },
    )
    .unwrap_err();
    assert!(matches!(err, AppError::PrincipalMismatch(_)));

    // Still open for the right driver.
    accept(&state, &notification).expect("owner accepts");
}

#[tokio::test]
async fn accept_just_before_expiry_succeeds_but_lapsed_accept_is_expired() {
    let (state, clock) = test_state();
    let broadcast = make_broadcast(&state, 2, 3600);
    let assignment = commit_pairs(&state, broadcast.id, pairs(2)).expect("commit");
    let first = notify(&state, &broadcast, &assignment, 0);
    let second = notify(&state, &broadcast, &assignment, 1);

    clock.set(base_time() + Duration::seconds(299));
    accept(&state, &first).expect("accept at t=299");

    clock.set(base_time() + Duration::seconds(301));
    let err = accept(&state, &second).unwrap_err();
    assert!(matches!(err, AppError::Expired(_)));

    // Surfaced as expired, not silently accepted, and the cascade ran.
    let stored = state.notifications.get(&second.id).expect("notification");
    assert_eq!(stored.status, NotificationStatus::Expired);

    let resolved = state.assignments.get(&assignment.id).expect("assignment");
    let da = &resolved.driver_assignments[1];
    assert_eq!(da.status, DriverAssignmentStatus::Expired);
    assert!(!state.active_drivers.contains_key(&da.driver_id));

    let snapshot = registry::query(&state, broadcast.id).expect("broadcast");
    assert_eq!(snapshot.filled_count, 1);
}

#[tokio::test]
async fn declined_slot_is_committable_again() {
    let (state, _clock) = test_state();
    let broadcast = make_broadcast(&state, 3, 3600);
    let committed = pairs(3);
    let assignment = commit_pairs(&state, broadcast.id, committed.clone()).expect("commit");

    let n1 = notify(&state, &broadcast, &assignment, 0);
    let n2 = notify(&state, &broadcast, &assignment, 1);
    let n3 = notify(&state, &broadcast, &assignment, 2);

    accept(&state, &n1).expect("driver 1 accepts");
    response::decline(
        &state,
        n2.id,
        Principal::driver(n2.driver_id),
        Some("vehicle in workshop".to_string()),
    )
    .expect("driver 2 declines");
    accept(&state, &n3).expect("driver 3 accepts");

    let resolved = state.assignments.get(&assignment.id).expect("assignment");
    assert_eq!(resolved.status, AssignmentStatus::PartiallyAccepted);
    assert_eq!(
        resolved.driver_assignments[1].status,
        DriverAssignmentStatus::Declined
    );
    assert_eq!(
        resolved.driver_assignments[1].decline_reason.as_deref(),
        Some("vehicle in workshop")
    );
    assert!(resolved.driver_assignments[0].is_active());
    assert!(!resolved.driver_assignments[1].is_active());
    drop(resolved);

    // The declined pair is free again and the slot reopened.
    let snapshot = registry::query(&state, broadcast.id).expect("broadcast");
    assert_eq!(snapshot.filled_count, 2);
    assert_eq!(snapshot.status, BroadcastStatus::PartiallyFilled);

    commit_pairs(&state, broadcast.id, vec![committed[1]]).expect("reassignment commit");
    let snapshot = registry::query(&state, broadcast.id).expect("broadcast");
    assert_eq!(snapshot.filled_count, 3);
    assert_eq!(snapshot.status, BroadcastStatus::FullyFilled);
}

#[tokio::test]
async fn out_of_order_samples_never_regress_current() {
    let (state, _clock) = test_state();
    let broadcast = make_broadcast(&state, 1, 3600);
    let assignment = commit_pairs(&state, broadcast.id, pairs(1)).expect("commit");
    let notification = notify(&state, &broadcast, &assignment, 0);
    let trip = accept(&state, &notification).expect("accept");

    let t = base_time();
    for (offset, lat) in [(100, 1.0), (105, 2.0), (102, 3.0), (110, 4.0)] {
        tracking::ingest(&state, trip.id, sample(t + Duration::seconds(offset), lat))
            .expect("ingest");

        if offset == 102 {
            let snapshot = tracking::query(&state, trip.id).expect("query");
            let current = snapshot.current.expect("current");
            // The stale ts=102 sample never replaced ts=105.
            assert_eq!(current.recorded_at, t + Duration::seconds(105));
            assert_eq!(current.lat, 2.0);
        }
    }

    let snapshot = tracking::query(&state, trip.id).expect("query");
    let current = snapshot.current.expect("current");
    assert_eq!(current.recorded_at, t + Duration::seconds(110));

    // All four samples retrievable, alongside the acceptance seed.
    let history = tracking::history(&state, trip.id, None, None).expect("history");
    assert_eq!(history.len(), 5);
    for offset in [100, 105, 102, 110] {
        assert!(history
            .iter()
            .any(|s| s.recorded_at == t + Duration::seconds(offset)));
    }
}

#[tokio::test]
async fn history_is_bounded_and_drops_oldest() {
    let (state, _clock) = test_state();
    let broadcast = make_broadcast(&state, 1, 3600);
    let assignment = commit_pairs(&state, broadcast.id, pairs(1)).expect("commit");
    let notification = notify(&state, &broadcast, &assignment, 0);
    let trip = accept(&state, &notification).expect("accept");

    let limit = state.settings.tracking_history_limit;
    let t = base_time();
    for i in 0..(limit + 10) {
        tracking::ingest(&state, trip.id, sample(t + Duration::seconds(i as i64 + 1), 0.0))
            .expect("ingest");
    }

    let history = tracking::history(&state, trip.id, None, None).expect("history");
    assert_eq!(history.len(), limit);
    // The acceptance seed and earliest samples were evicted first.
    assert!(history[0].recorded_at > t);
}

#[tokio::test]
async fn expiry_sweep_expires_notification_and_driver_assignment() {
    let (state, clock) = test_state();
    let broadcast = make_broadcast(&state, 2, 3600);
    let assignment = commit_pairs(&state, broadcast.id, pairs(1)).expect("commit");
    let notification = notify(&state, &broadcast, &assignment, 0);

    clock.set(base_time() + Duration::seconds(301));

    let report = expiry::sweep(&state);
    assert_eq!(report.notifications_expired, 1);

    let stored = state.notifications.get(&notification.id).expect("notification");
    assert_eq!(stored.status, NotificationStatus::Expired);
    drop(stored);

    let resolved = state.assignments.get(&assignment.id).expect("assignment");
    let da = &resolved.driver_assignments[0];
    assert_eq!(da.status, DriverAssignmentStatus::Expired);
    assert!(!state.active_drivers.contains_key(&da.driver_id));
    assert!(!state.active_vehicles.contains_key(&da.vehicle_id));
    drop(resolved);

    let snapshot = registry::query(&state, broadcast.id).expect("broadcast");
    assert_eq!(snapshot.filled_count, 0);

    // A second sweep (or a concurrent scheduler instance) is a no-op.
    let report = expiry::sweep(&state);
    assert_eq!(report.notifications_expired, 0);
    assert_eq!(report.broadcasts_expired, 0);
}

#[tokio::test]
async fn expiry_sweep_expires_underfilled_broadcast() {
    let (state, clock) = test_state();
    let broadcast = make_broadcast(&state, 3, 200);
    commit_pairs(&state, broadcast.id, pairs(1)).expect("commit");

    clock.set(base_time() + Duration::seconds(201));
    let report = expiry::sweep(&state);
    assert_eq!(report.broadcasts_expired, 1);

    let snapshot = registry::query(&state, broadcast.id).expect("broadcast");
    assert_eq!(snapshot.status, BroadcastStatus::Expired);
    assert_eq!(snapshot.filled_count, 1);

    // The pending notification lapses later; its slot release must not
    // disturb the already-expired broadcast.
    clock.set(base_time() + Duration::seconds(301));
    expiry::sweep(&state);
    let snapshot = registry::query(&state, broadcast.id).expect("broadcast");
    assert_eq!(snapshot.status, BroadcastStatus::Expired);
    assert_eq!(snapshot.filled_count, 1);
}

#[tokio::test]
async fn commit_against_lapsed_broadcast_is_rejected_before_the_sweep() {
    let (state, clock) = test_state();
    let broadcast = make_broadcast(&state, 2, 100);

    clock.set(base_time() + Duration::seconds(101));
    let err = commit_pairs(&state, broadcast.id, pairs(1)).unwrap_err();
    assert!(matches!(err, AppError::Expired(_)));
}

#[tokio::test]
async fn mark_read_is_idempotent() {
    let (state, clock) = test_state();
    let broadcast = make_broadcast(&state, 1, 3600);
    let assignment = commit_pairs(&state, broadcast.id, pairs(1)).expect("commit");
    let notification = notify(&state, &broadcast, &assignment, 0);

    let first = dispatcher::mark_read(&state, notification.id).expect("mark read");
    assert!(first.read);
    let read_at = first.read_at.expect("read timestamp");

    clock.advance(Duration::seconds(30));
    let second = dispatcher::mark_read(&state, notification.id).expect("mark read again");
    assert_eq!(second.read_at, Some(read_at));
    assert_eq!(second.status, NotificationStatus::PendingResponse);
}

struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn send(
        &self,
        _channel: Channel,
        _driver_id: Uuid,
        _payload: NotificationPayload,
    ) -> BoxFuture<'static, Result<String, DeliveryError>> {
        Box::pin(async { Err(DeliveryError("provider down".to_string())) })
    }
}

#[tokio::test]
async fn delivery_failure_on_all_channels_keeps_the_notification() {
    let clock = Arc::new(ManualClock::new(base_time()));
    let settings = EngineSettings {
        delivery_attempts: 2,
        delivery_backoff_ms: 0,
        sms_fallback_secs: 0,
        ..EngineSettings::default()
    };
    let (mut state, _rx) = AppState::new(settings, 64, 64);
    state.clock = clock;
    state.notifier = Arc::new(FailingNotifier);
    let state = Arc::new(state);

    let broadcast = make_broadcast(&state, 1, 3600);
    let assignment = commit_pairs(&state, broadcast.id, pairs(1)).expect("commit");
    let notification = notify(&state, &broadcast, &assignment, 0);

    dispatcher::deliver(state.clone(), notification.id, notification.driver_id).await;

    let stored = state.notifications.get(&notification.id).expect("notification");
    assert_eq!(stored.status, NotificationStatus::PendingResponse);
    // Push and SMS both retried to exhaustion; websocket skipped since the
    // driver has no live connection.
    assert_eq!(stored.deliveries.len(), 4);
    assert!(stored
        .deliveries
        .iter()
        .all(|attempt| matches!(attempt.outcome, DeliveryOutcome::Failed { .. })));
}

struct RecordingNotifier {
    started: std::time::Instant,
    attempts: std::sync::Mutex<Vec<(Channel, std::time::Duration)>>,
}

impl Notifier for RecordingNotifier {
    fn send(
        &self,
        channel: Channel,
        _driver_id: Uuid,
        _payload: NotificationPayload,
    ) -> BoxFuture<'static, Result<String, DeliveryError>> {
        self.attempts
            .lock()
            .unwrap()
            .push((channel, self.started.elapsed()));
        Box::pin(async move {
            match channel {
                Channel::Push => Err(DeliveryError("push provider down".to_string())),
                _ => Ok(format!("delivered-{channel:?}")),
            }
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failing_push_does_not_delay_the_websocket_attempt() {
    let clock = Arc::new(ManualClock::new(base_time()));
    let settings = EngineSettings {
        delivery_attempts: 3,
        delivery_backoff_ms: 200,
        sms_fallback_secs: 0,
        ..EngineSettings::default()
    };
    let (mut state, _rx) = AppState::new(settings, 64, 64);
    state.clock = clock;
    let notifier = Arc::new(RecordingNotifier {
        started: std::time::Instant::now(),
        attempts: std::sync::Mutex::new(Vec::new()),
    });
    state.notifier = notifier.clone();
    let state = Arc::new(state);

    let broadcast = make_broadcast(&state, 1, 3600);
    let assignment = commit_pairs(&state, broadcast.id, pairs(1)).expect("commit");
    let notification = notify(&state, &broadcast, &assignment, 0);
    state.connected_drivers.insert(notification.driver_id, ());

    dispatcher::deliver(state.clone(), notification.id, notification.driver_id).await;

    let attempts = notifier.attempts.lock().unwrap();
    let websocket_at = attempts
        .iter()
        .find(|(channel, _)| *channel == Channel::Websocket)
        .map(|(_, at)| *at)
        .expect("websocket attempted");
    let last_push_at = attempts
        .iter()
        .filter(|(channel, _)| *channel == Channel::Push)
        .map(|(_, at)| *at)
        .last()
        .expect("push attempted");

    // Push fails three times with 200ms/400ms backoffs in between; the
    // websocket message goes out right away instead of queueing behind it.
    assert!(last_push_at >= std::time::Duration::from_millis(500));
    assert!(websocket_at < std::time::Duration::from_millis(150));

    let stored = state.notifications.get(&notification.id).expect("notification");
    assert!(stored.deliveries.iter().any(|attempt| {
        attempt.channel == Channel::Websocket
            && matches!(attempt.outcome, DeliveryOutcome::Delivered { .. })
    }));
}

#[tokio::test]
async fn commit_requires_a_transporter_principal() {
    let (state, _clock) = test_state();
    let broadcast = make_broadcast(&state, 2, 3600);

    let err = coordinator::commit(
        &state,
        broadcast.id,
        CommitRequest {
            principal: Principal::driver(Uuid::new_v4()),
            truck_count: 1,
            pairs: pairs(1),
        },
    )
    .unwrap_err();
    assert!(matches!(err, AppError::PrincipalMismatch(_)));

    let snapshot = registry::query(&state, broadcast.id).expect("broadcast");
    assert_eq!(snapshot.filled_count, 0);
    assert_eq!(snapshot.status, BroadcastStatus::Active);
}

#[tokio::test]
async fn duplicate_notification_for_driver_assignment_is_rejected() {
    let (state, _clock) = test_state();
    let broadcast = make_broadcast(&state, 1, 3600);
    let assignment = commit_pairs(&state, broadcast.id, pairs(1)).expect("commit");

    notify(&state, &broadcast, &assignment, 0);

    let da = &assignment.driver_assignments[0];
    let err = dispatcher::create(
        &state,
        NotificationJob {
            driver_assignment_id: da.id,
            assignment_id: assignment.id,
            driver_id: da.driver_id,
            payload: NotificationPayload {
                broadcast_id: broadcast.id,
                pickup: broadcast.route.origin,
                dropoff: broadcast.route.destination,
                vehicle_type: broadcast.vehicle_type.clone(),
                fare_amount: broadcast.fare.amount,
            },
        },
        None,
    )
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(state.notifications.len(), 1);
}

#[tokio::test]
async fn completed_trip_freezes_tracking_and_frees_the_pair() {
    let (state, _clock) = test_state();
    let broadcast = make_broadcast(&state, 1, 3600);
    let assignment = commit_pairs(&state, broadcast.id, pairs(1)).expect("commit");
    let notification = notify(&state, &broadcast, &assignment, 0);
    let trip = accept(&state, &notification).expect("accept");

    tracking::mark_milestone(&state, trip.id, MilestoneKind::PickupReached).expect("pickup");
    tracking::mark_milestone(&state, trip.id, MilestoneKind::TripStarted).expect("start");
    tracking::mark_milestone(&state, trip.id, MilestoneKind::DropReached).expect("drop");
    tracking::mark_milestone(&state, trip.id, MilestoneKind::Completed).expect("complete");

    let err = tracking::ingest(
        &state,
        trip.id,
        sample(base_time() + Duration::seconds(10), 0.0),
    )
    .unwrap_err();
    assert!(matches!(err, AppError::TripTerminal(_)));

    // History survives the freeze; driver and vehicle are free again.
    let history = tracking::history(&state, trip.id, None, None).expect("history");
    assert_eq!(history.len(), 1);
    assert!(!state.active_drivers.contains_key(&trip.driver_id));
    assert!(!state.active_vehicles.contains_key(&trip.vehicle_id));
}

#[tokio::test]
async fn milestones_must_follow_the_trip_order() {
    let (state, _clock) = test_state();
    let broadcast = make_broadcast(&state, 1, 3600);
    let assignment = commit_pairs(&state, broadcast.id, pairs(1)).expect("commit");
    let notification = notify(&state, &broadcast, &assignment, 0);
    let trip = accept(&state, &notification).expect("accept");

    let err = tracking::mark_milestone(&state, trip.id, MilestoneKind::DropReached).unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // Cancellation is allowed from any live state and is terminal.
    tracking::mark_milestone(&state, trip.id, MilestoneKind::Cancelled).expect("cancel");
    let err = tracking::mark_milestone(&state, trip.id, MilestoneKind::PickupReached).unwrap_err();
    assert!(matches!(err, AppError::TripTerminal(_)));
}

#[tokio::test]
async fn cancelled_broadcast_rejects_new_commits() {
    let (state, _clock) = test_state();
    let broadcast = make_broadcast(&state, 2, 3600);

    registry::cancel(&state, broadcast.id).expect("cancel");

    let err = commit_pairs(&state, broadcast.id, pairs(1)).unwrap_err();
    assert!(matches!(err, AppError::Expired(_)));
}
