use std::env;
use std::time::Duration;

/// Timer knobs for the hub. Defaults match production; tests shrink them.
#[derive(Clone, Debug)]
pub struct HubConfig {
    /// Heartbeat broadcast and staleness sweep cadence.
    pub heartbeat_interval: Duration,
    /// A session with no successful push for longer than this is reaped.
    pub stale_after: Duration,
    /// Cadence of the permission-filtered `metricsUpdate` broadcast.
    pub metrics_interval: Duration,
    /// Time a `forceLogout` message gets to flush before the close.
    pub logout_grace: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            heartbeat_interval: Duration::from_secs(30),
            stale_after: Duration::from_secs(60),
            metrics_interval: Duration::from_secs(10),
            logout_grace: Duration::from_millis(400),
        }
    }
}

impl HubConfig {
    /// Reads optional overrides from the environment, in seconds
    /// (`HEARTBEAT_INTERVAL_SECS`, `STALE_AFTER_SECS`,
    /// `METRICS_INTERVAL_SECS`) and milliseconds (`LOGOUT_GRACE_MS`).
    pub fn from_env() -> Self {
        let mut config = HubConfig::default();

        if let Some(secs) = read_u64("HEARTBEAT_INTERVAL_SECS") {
            config.heartbeat_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = read_u64("STALE_AFTER_SECS") {
            config.stale_after = Duration::from_secs(secs);
        }
        if let Some(secs) = read_u64("METRICS_INTERVAL_SECS") {
            config.metrics_interval = Duration::from_secs(secs);
        }
        if let Some(ms) = read_u64("LOGOUT_GRACE_MS") {
            config.logout_grace = Duration::from_millis(ms);
        }

        config
    }
}

fn read_u64(key: &str) -> Option<u64> {
    env::var(key).ok()?.parse().ok()
}
