use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub notification_queue_size: usize,
    pub event_buffer_size: usize,
    pub expiry_sweep_secs: u64,
    pub engine: EngineSettings,
}

/// Timing and bound knobs consumed by the engine itself, kept separate from
/// server wiring so tests can construct them directly.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub notification_expiry_secs: i64,
    pub sms_fallback_secs: u64,
    pub delivery_attempts: u32,
    pub delivery_backoff_ms: u64,
    pub tracking_history_limit: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            notification_expiry_secs: 300,
            sms_fallback_secs: 120,
            delivery_attempts: 3,
            delivery_backoff_ms: 500,
            tracking_history_limit: 512,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            notification_queue_size: parse_or_default("NOTIFICATION_QUEUE_SIZE", 1024)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            expiry_sweep_secs: parse_or_default("EXPIRY_SWEEP_SECS", 60)?,
            engine: EngineSettings {
                notification_expiry_secs: parse_or_default("NOTIFICATION_EXPIRY_SECS", 300)?,
                sms_fallback_secs: parse_or_default("SMS_FALLBACK_SECS", 120)?,
                delivery_attempts: parse_or_default("DELIVERY_ATTEMPTS", 3)?,
                delivery_backoff_ms: parse_or_default("DELIVERY_BACKOFF_MS", 500)?,
                tracking_history_limit: parse_or_default("TRACKING_HISTORY_LIMIT", 512)?,
            },
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
