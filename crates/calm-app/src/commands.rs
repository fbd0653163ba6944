//! Subcommand implementations.
//!
//! Each one-shot command returns its report as a string so `main` only
//! prints; the work itself goes through [`RealtimeStore`].

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use calm_common::{CalmError, Clock, StoreError};
use calm_config::CalmConfig;
use calm_presence::record::{
    daily_stat_path, parse_daily_stat, parse_sessions, DailyStat, SessionRecord,
    DAILY_STATS_ROOT, SESSIONS_ROOT,
};
use calm_presence::{
    PresenceTracker, ReapReport, RealtimeStore, RemoteStore, SessionIdentity, SessionReaper,
};
use chrono::{DateTime, NaiveDate};

use crate::settings;

/// Connect and wait for the link, failing after the request timeout.
pub async fn connect(config: &CalmConfig) -> calm_common::Result<Arc<RemoteStore>> {
    let remote = RemoteStore::connect(settings::remote_store_config(config));
    let wait = Duration::from_secs(config.store.request_timeout_secs.max(1));
    if !remote.wait_connected(wait).await {
        remote.disconnect().await;
        return Err(CalmError::Store(StoreError::Disconnected));
    }
    Ok(Arc::new(remote))
}

// ---------------------------------------------------------------------------
// presence
// ---------------------------------------------------------------------------

/// Track this profile's session until Ctrl-C, then stop gracefully.
pub async fn presence(config: &CalmConfig, clock: Arc<dyn Clock>) -> calm_common::Result<()> {
    let identity = SessionIdentity::with_clock(settings::identity_path(config), Arc::clone(&clock));
    let session_id = identity.get_or_create_session_id();

    // Connection is not required up front; the tracker marks the session
    // online whenever the link comes up.
    let remote = Arc::new(RemoteStore::connect(settings::remote_store_config(config)));
    let store: Arc<dyn RealtimeStore> = remote.clone();
    let tracker = PresenceTracker::new(store, clock, settings::presence_settings(config));
    let handle = tracker.start(session_id.clone());

    println!("tracking session {session_id} (Ctrl-C to stop)");
    tokio::signal::ctrl_c().await?;

    tracing::info!(session = %session_id, "Stopping presence");
    handle.stop().await;
    remote.disconnect().await;
    Ok(())
}

// ---------------------------------------------------------------------------
// sessions
// ---------------------------------------------------------------------------

pub async fn sessions(store: &dyn RealtimeStore, clock: &dyn Clock) -> calm_common::Result<String> {
    let snapshot = store.get(SESSIONS_ROOT).await?;
    let sessions = parse_sessions(snapshot.as_ref());
    Ok(format_sessions(&sessions, clock.now_millis()))
}

fn format_millis(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

pub fn format_sessions(sessions: &[(String, SessionRecord)], now: i64) -> String {
    if sessions.is_empty() {
        return "no sessions".to_string();
    }
    let mut sorted: Vec<&(String, SessionRecord)> = sessions.iter().collect();
    sorted.sort_by(|a, b| b.1.last_active.cmp(&a.1.last_active).then(a.0.cmp(&b.0)));

    let mut out = String::new();
    let _ = writeln!(out, "{:<28} {:<8} {:<20} {:<20} IDLE", "SESSION", "STATUS", "STARTED", "ENDED");
    for (id, record) in &sorted {
        let status = if record.is_online() { "online" } else { "offline" };
        let ended = record
            .end_time
            .map(format_millis)
            .unwrap_or_else(|| "-".to_string());
        let idle_secs = (now - record.last_active).max(0) / 1_000;
        let _ = writeln!(
            out,
            "{:<28} {:<8} {:<20} {:<20} {}s",
            id,
            status,
            format_millis(record.start_time),
            ended,
            idle_secs
        );
    }
    let online = calm_presence::count_online(sessions);
    let _ = write!(out, "{} sessions, {} online", sessions.len(), online);
    out
}

// ---------------------------------------------------------------------------
// stats
// ---------------------------------------------------------------------------

pub async fn stats(store: &dyn RealtimeStore, date: Option<NaiveDate>) -> calm_common::Result<String> {
    let stats = match date {
        Some(date) => {
            let key = date.format(calm_common::clock::DATE_KEY_FORMAT).to_string();
            let value = store.get(&daily_stat_path(&key)).await?;
            match parse_daily_stat(&key, value.as_ref()) {
                Some(stat) => vec![stat],
                None => return Ok(format!("no stats for {key}")),
            }
        }
        None => {
            let value = store.get(DAILY_STATS_ROOT).await?;
            let mut stats: Vec<DailyStat> = value
                .as_ref()
                .and_then(|v| v.as_object())
                .map(|days| {
                    days.iter()
                        .filter_map(|(key, day)| parse_daily_stat(key, Some(day)))
                        .collect()
                })
                .unwrap_or_default();
            stats.sort_by(|a, b| a.date.cmp(&b.date));
            stats
        }
    };
    Ok(format_stats(&stats))
}

pub fn format_stats(stats: &[DailyStat]) -> String {
    if stats.is_empty() {
        return "no stats".to_string();
    }
    let mut out = String::from("DATE        MAX ONLINE");
    for stat in stats {
        let _ = write!(out, "\n{:<11} {}", stat.date, stat.max_online);
    }
    out
}

// ---------------------------------------------------------------------------
// reap
// ---------------------------------------------------------------------------

pub async fn reap(
    store: Arc<dyn RealtimeStore>,
    clock: Arc<dyn Clock>,
    config: &CalmConfig,
) -> String {
    let reaper = SessionReaper::new(store, clock, config.presence.stale_threshold());
    format_report(&reaper.scan_and_reap().await)
}

pub fn format_report(report: &ReapReport) -> String {
    let mut out = format!(
        "scanned {}, reaped {}, failed {}",
        report.scanned,
        report.reaped.len(),
        report.failed
    );
    for id in &report.reaped {
        let _ = write!(out, "\n  reaped {id}");
    }
    out
}
