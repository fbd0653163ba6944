//! Validation for the presence timers, store client, and store server.

use crate::schema::CalmConfig;

use super::helpers::{validate_less_than, validate_range};

/// Heartbeat, staleness, and reaper timing.
///
/// A heartbeat slower than the threshold would let the reaper expire live
/// sessions; a threshold at or above the scan interval lets a stale record
/// survive an extra cycle.
pub(crate) fn validate_presence(errors: &mut Vec<String>, config: &CalmConfig) {
    let p = &config.presence;
    validate_range(
        errors,
        "presence.heartbeat_interval_ms",
        p.heartbeat_interval_ms,
        500,
        60_000,
    );
    validate_range(
        errors,
        "presence.stale_threshold_ms",
        p.stale_threshold_ms,
        1_000,
        300_000,
    );
    validate_range(
        errors,
        "presence.reaper_interval_ms",
        p.reaper_interval_ms,
        1_000,
        600_000,
    );
    validate_less_than(
        errors,
        "presence.heartbeat_interval_ms",
        p.heartbeat_interval_ms,
        "presence.stale_threshold_ms",
        p.stale_threshold_ms,
    );
    validate_less_than(
        errors,
        "presence.stale_threshold_ms",
        p.stale_threshold_ms,
        "presence.reaper_interval_ms",
        p.reaper_interval_ms,
    );
}

/// Store client URL and backoff.
pub(crate) fn validate_store(errors: &mut Vec<String>, config: &CalmConfig) {
    let s = &config.store;
    if !(s.url.starts_with("ws://") || s.url.starts_with("wss://")) {
        errors.push(format!(
            "store.url = {} must start with ws:// or wss://",
            s.url
        ));
    }
    validate_range(errors, "store.reconnect_delay_secs", s.reconnect_delay_secs, 1, 60);
    validate_range(
        errors,
        "store.max_reconnect_delay_secs",
        s.max_reconnect_delay_secs,
        1,
        600,
    );
    if s.max_reconnect_delay_secs < s.reconnect_delay_secs {
        errors.push(format!(
            "store.max_reconnect_delay_secs = {} is below store.reconnect_delay_secs = {}",
            s.max_reconnect_delay_secs, s.reconnect_delay_secs
        ));
    }
    validate_range(
        errors,
        "store.heartbeat_interval_secs",
        s.heartbeat_interval_secs,
        1,
        300,
    );
    validate_range(errors, "store.request_timeout_secs", s.request_timeout_secs, 1, 120);
}

/// Server listen address and liveness lease.
pub(crate) fn validate_server(errors: &mut Vec<String>, config: &CalmConfig) {
    if config.server.bind.trim().is_empty() {
        errors.push("server.bind must not be empty".into());
    }
    validate_range(errors, "server.port", config.server.port, 1, u16::MAX);
    validate_range(
        errors,
        "server.idle_timeout_secs",
        config.server.idle_timeout_secs,
        2,
        3_600,
    );
    validate_less_than(
        errors,
        "store.heartbeat_interval_secs",
        config.store.heartbeat_interval_secs,
        "server.idle_timeout_secs",
        config.server.idle_timeout_secs,
    );
}
