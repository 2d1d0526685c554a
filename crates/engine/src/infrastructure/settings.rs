//! Engine settings, loaded from `DELVE_*` environment variables.

use std::time::Duration;

/// Tunable engine parameters with production defaults.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Combat tick period. Short enough that due swings land promptly,
    /// long enough to avoid busywork.
    pub tick_interval: Duration,
    /// Expiry/cleanup sweep period.
    pub sweep_interval: Duration,
    /// How long a terminal session lingers before the sweeper deletes it.
    pub cleanup_grace_ms: i64,
    /// Upper bound of the random first-swing stagger.
    pub stagger_max_ms: u64,
    /// Default event resolution timeout.
    pub event_timeout_ms: i64,
    /// Need/greed roll collapse deadline per drop.
    pub roll_timeout_ms: i64,
    /// Broadcast channel capacity for the publish adapter.
    pub publish_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(300),
            sweep_interval: Duration::from_secs(15),
            cleanup_grace_ms: 30_000,
            stagger_max_ms: 2_000,
            event_timeout_ms: 60_000,
            roll_timeout_ms: 30_000,
            publish_capacity: 256,
        }
    }
}

impl EngineSettings {
    /// Read settings from the environment, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tick_interval: env_ms("DELVE_TICK_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick_interval),
            sweep_interval: env_ms("DELVE_SWEEP_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.sweep_interval),
            cleanup_grace_ms: env_ms("DELVE_CLEANUP_GRACE_MS")
                .map(|v| v as i64)
                .unwrap_or(defaults.cleanup_grace_ms),
            stagger_max_ms: env_ms("DELVE_STAGGER_MAX_MS").unwrap_or(defaults.stagger_max_ms),
            event_timeout_ms: env_ms("DELVE_EVENT_TIMEOUT_MS")
                .map(|v| v as i64)
                .unwrap_or(defaults.event_timeout_ms),
            roll_timeout_ms: env_ms("DELVE_ROLL_TIMEOUT_MS")
                .map(|v| v as i64)
                .unwrap_or(defaults.roll_timeout_ms),
            publish_capacity: env_ms("DELVE_PUBLISH_CAPACITY")
                .map(|v| v as usize)
                .unwrap_or(defaults.publish_capacity),
        }
    }
}

fn env_ms(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
