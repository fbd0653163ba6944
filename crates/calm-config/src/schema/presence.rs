//! Presence timing and session identity configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timers driving the presence tracker.
///
/// The heartbeat must beat faster than the staleness threshold, and the
/// threshold must be shorter than the reaper's scan interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Heartbeat interval in milliseconds (valid range: 500-60000).
    pub heartbeat_interval_ms: u32,
    /// Reaper scan interval in milliseconds (valid range: 1000-600000).
    pub reaper_interval_ms: u32,
    /// Silence after which an online record is reaped (valid range: 1000-300000).
    pub stale_threshold_ms: u32,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 3_000,
            reaper_interval_ms: 10_000,
            stale_threshold_ms: 5_000,
        }
    }
}

impl PresenceConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.into())
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms.into())
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::from_millis(self.stale_threshold_ms.into())
    }
}

/// Where the session id is persisted between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Override for the session id file. Defaults to the platform data dir.
    pub path: Option<PathBuf>,
}
