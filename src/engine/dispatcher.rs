use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::error::AppError;
use crate::models::notification::{
    Channel, DeliveryAttempt, DeliveryOutcome, Notification, NotificationPayload,
    NotificationStatus,
};
use crate::state::AppState;

/// Work item queued by the coordinator for every fresh driver assignment.
pub struct NotificationJob {
    pub driver_assignment_id: Uuid,
    pub assignment_id: Uuid,
    pub driver_id: Uuid,
    pub payload: NotificationPayload,
}

/// One row of the ordered fallback policy. Channels are tried top to
/// bottom; a step's gate decides whether it still applies when its turn
/// comes.
struct ChannelStep {
    channel: Channel,
    gate: StepGate,
    delay: Duration,
}

enum StepGate {
    Always,
    DriverConnected,
    StillUnread,
}

fn delivery_plan(settings: &EngineSettings) -> [ChannelStep; 3] {
    [
        ChannelStep {
            channel: Channel::Push,
            gate: StepGate::Always,
            delay: Duration::ZERO,
        },
        ChannelStep {
            channel: Channel::Websocket,
            gate: StepGate::DriverConnected,
            delay: Duration::ZERO,
        },
        ChannelStep {
            channel: Channel::Sms,
            gate: StepGate::StillUnread,
            delay: Duration::from_secs(settings.sms_fallback_secs),
        },
    ]
}

pub async fn run_notification_dispatcher(
    state: Arc<AppState>,
    mut rx: mpsc::Receiver<NotificationJob>,
) {
    info!("notification dispatcher started");

    while let Some(job) = rx.recv().await {
        let driver_id = job.driver_id;
        match create(&state, job, None) {
            Ok(notification) => {
                tokio::spawn(deliver(state.clone(), notification.id, driver_id));
            }
            Err(err) => {
                warn!(error = %err, "skipped notification job");
            }
        }
    }

    warn!("notification dispatcher stopped: queue channel closed");
}

/// Persists the notification for a driver assignment, exactly once. The
/// record outlives any delivery failure so it can be polled or resent.
pub fn create(
    state: &AppState,
    job: NotificationJob,
    expiry_secs: Option<i64>,
) -> Result<Notification, AppError> {
    let expiry_secs = expiry_secs.unwrap_or(state.settings.notification_expiry_secs);
    if expiry_secs <= 0 {
        return Err(AppError::Validation(
            "notification expiry must be > 0 seconds".to_string(),
        ));
    }

    let now = state.clock.now();
    let notification = Notification {
        id: Uuid::new_v4(),
        driver_assignment_id: job.driver_assignment_id,
        assignment_id: job.assignment_id,
        driver_id: job.driver_id,
        payload: job.payload,
        status: NotificationStatus::PendingResponse,
        read: false,
        read_at: None,
        responded_at: None,
        deliveries: Vec::new(),
        created_at: now,
        expiry: now + chrono::Duration::seconds(expiry_secs),
    };

    match state
        .notification_index
        .entry(job.driver_assignment_id)
    {
        dashmap::mapref::entry::Entry::Occupied(existing) => {
            return Err(AppError::Validation(format!(
                "driver assignment {} already has notification {}",
                job.driver_assignment_id,
                existing.get()
            )));
        }
        dashmap::mapref::entry::Entry::Vacant(slot) => {
            slot.insert(notification.id);
        }
    }

    state
        .notifications
        .insert(notification.id, notification.clone());

    info!(
        notification_id = %notification.id,
        driver_id = %notification.driver_id,
        expiry = %notification.expiry,
        "notification created"
    );

    Ok(notification)
}

/// Idempotent read receipt; never changes the response status.
pub fn mark_read(state: &AppState, id: Uuid) -> Result<Notification, AppError> {
    let mut notification = state
        .notifications
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))?;

    if !notification.read {
        notification.read = true;
        notification.read_at = Some(state.clock.now());
    }

    Ok(notification.clone())
}

/// Runs the fallback plan for one notification. Each channel gets its own
/// task: one provider's retry loop never delays another channel's first
/// attempt, and the SMS step still waits out its unread window on its own
/// timer. Holds no lock shared with commit/accept/decline.
pub async fn deliver(state: Arc<AppState>, notification_id: Uuid, driver_id: Uuid) {
    let payload = match state.notifications.get(&notification_id) {
        Some(n) => n.payload.clone(),
        None => return,
    };

    let mut channels = Vec::new();
    for step in delivery_plan(&state.settings) {
        let state = state.clone();
        let payload = payload.clone();
        channels.push(tokio::spawn(async move {
            if !step.delay.is_zero() {
                sleep(step.delay).await;
            }

            let applies = match step.gate {
                StepGate::Always => true,
                StepGate::DriverConnected => state.connected_drivers.contains_key(&driver_id),
                StepGate::StillUnread => state
                    .notifications
                    .get(&notification_id)
                    .map(|n| !n.read && n.status == NotificationStatus::PendingResponse)
                    .unwrap_or(false),
            };

            if applies {
                attempt_channel(&state, notification_id, driver_id, step.channel, &payload).await;
            }
        }));
    }

    for channel in channels {
        let _ = channel.await;
    }
}

async fn attempt_channel(
    state: &AppState,
    notification_id: Uuid,
    driver_id: Uuid,
    channel: Channel,
    payload: &NotificationPayload,
) {
    for attempt in 1..=state.settings.delivery_attempts {
        let result = state
            .notifier
            .send(channel, driver_id, payload.clone())
            .await;

        let (outcome, label) = match &result {
            Ok(delivery_id) => (
                DeliveryOutcome::Delivered {
                    delivery_id: delivery_id.clone(),
                },
                "success",
            ),
            Err(err) => (
                DeliveryOutcome::Failed {
                    error: err.to_string(),
                },
                "failure",
            ),
        };

        if let Some(mut notification) = state.notifications.get_mut(&notification_id) {
            notification.deliveries.push(DeliveryAttempt {
                channel,
                attempt,
                at: state.clock.now(),
                outcome,
            });
        }

        state
            .metrics
            .notification_deliveries_total
            .with_label_values(&[channel_label(channel), label])
            .inc();

        match result {
            Ok(_) => return,
            Err(err) => {
                warn!(
                    notification_id = %notification_id,
                    ?channel,
                    attempt,
                    error = %err,
                    "delivery attempt failed"
                );
                sleep(Duration::from_millis(
                    state.settings.delivery_backoff_ms * attempt as u64,
                ))
                .await;
            }
        }
    }
}

fn channel_label(channel: Channel) -> &'static str {
    match channel {
        Channel::Push => "push",
        Channel::Websocket => "websocket",
        Channel::Sms => "sms",
    }
}
