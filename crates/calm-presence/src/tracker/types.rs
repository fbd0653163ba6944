//! Timing settings for the presence tracker.

use std::time::Duration;

/// How often the tracker heartbeats and sweeps, and when a record counts
/// as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceSettings {
    /// Period of the `lastActive` refresh.
    pub heartbeat_interval: Duration,
    /// Period of the stale-session sweep.
    pub reaper_interval: Duration,
    /// Silence after which an online record is reaped.
    pub stale_threshold: Duration,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(3_000),
            reaper_interval: Duration::from_millis(10_000),
            stale_threshold: Duration::from_millis(5_000),
        }
    }
}
