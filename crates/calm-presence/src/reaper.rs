//! Staleness sweep over `sessions`.
//!
//! Each scan takes one snapshot read and force-writes every stale online
//! record offline. Two reapers racing on the same record is harmless: both
//! write an equivalent offline state and the last write wins.

use std::sync::Arc;
use std::time::Duration;

use calm_common::Clock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::record::{parse_sessions, session_path, SessionRecord, SESSIONS_ROOT};
use crate::store::RealtimeStore;

/// Outcome of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub scanned: usize,
    /// Ids successfully written offline.
    pub reaped: Vec<String>,
    pub failed: usize,
}

/// Online records silent for longer than `threshold_ms` at `now`.
pub fn find_stale(
    sessions: &[(String, SessionRecord)],
    now: i64,
    threshold_ms: i64,
) -> Vec<(&str, &SessionRecord)> {
    sessions
        .iter()
        .filter(|(_, record)| record.is_stale(now, threshold_ms))
        .map(|(id, record)| (id.as_str(), record))
        .collect()
}

#[derive(Clone)]
pub struct SessionReaper {
    store: Arc<dyn RealtimeStore>,
    clock: Arc<dyn Clock>,
    stale_threshold: Duration,
}

impl SessionReaper {
    pub fn new(store: Arc<dyn RealtimeStore>, clock: Arc<dyn Clock>, stale_threshold: Duration) -> Self {
        Self {
            store,
            clock,
            stale_threshold,
        }
    }

    /// Read all sessions once and write stale online ones offline.
    pub async fn scan_and_reap(&self) -> ReapReport {
        let snapshot = match self.store.get(SESSIONS_ROOT).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Reaper could not read sessions");
                return ReapReport::default();
            }
        };
        let sessions = parse_sessions(snapshot.as_ref());
        let now = self.clock.now_millis();
        let threshold_ms = i64::try_from(self.stale_threshold.as_millis()).unwrap_or(i64::MAX);

        let mut report = ReapReport {
            scanned: sessions.len(),
            ..Default::default()
        };

        for (id, record) in find_stale(&sessions, now, threshold_ms) {
            let reaped = record.reaped(now);
            match self.store.set(&session_path(id), reaped.to_value()).await {
                Ok(()) => {
                    info!(
                        session = %id,
                        silent_ms = now - record.last_active,
                        "Reaped stale session"
                    );
                    report.reaped.push(id.to_string());
                }
                Err(e) => {
                    warn!(session = %id, error = %e, "Failed to reap session");
                    report.failed += 1;
                }
            }
        }

        debug!(
            scanned = report.scanned,
            reaped = report.reaped.len(),
            "Reaper scan complete"
        );
        report
    }

    /// Run [`Self::scan_and_reap`] every `interval`, first scan one interval
    /// from now.
    pub fn spawn_interval(&self, interval: Duration) -> JoinHandle<()> {
        let reaper = self.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                reaper.scan_and_reap().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SessionStatus;
    use crate::store::MemoryStore;
    use calm_common::ManualClock;
    use chrono::NaiveDate;
    use serde_json::json;

    fn setup(now: i64) -> (MemoryStore, Arc<ManualClock>, SessionReaper) {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(
            now,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        ));
        let reaper = SessionReaper::new(
            Arc::new(store.client()),
            clock.clone(),
            Duration::from_millis(5_000),
        );
        (store, clock, reaper)
    }

    fn read(store: &MemoryStore, id: &str) -> SessionRecord {
        serde_json::from_value(store.read(&session_path(id)).unwrap().unwrap()).unwrap()
    }

    #[test]
    fn find_stale_filters_online_and_silent() {
        let sessions = vec![
            ("fresh".to_string(), SessionRecord::online(0, 9_000)),
            ("stale".to_string(), SessionRecord::online(0, 1_000)),
            ("gone".to_string(), SessionRecord::offline(0, 1_000)),
            ("edge".to_string(), SessionRecord::online(0, 5_000)),
        ];
        let stale: Vec<&str> = find_stale(&sessions, 10_000, 5_000)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(stale, vec!["stale"]);
    }

    #[tokio::test]
    async fn silent_session_is_reaped_at_scan_time() {
        let (store, _clock, reaper) = setup(10_000);
        store
            .write(&session_path("A"), SessionRecord::online(0, 0).to_value())
            .unwrap();

        let report = reaper.scan_and_reap().await;

        assert_eq!(report.scanned, 1);
        assert_eq!(report.reaped, vec!["A".to_string()]);
        let record = read(&store, "A");
        assert_eq!(record.status, SessionStatus::Offline);
        assert_eq!(record.end_time, Some(10_000));
        assert_eq!(record.start_time, 0);
        assert_eq!(record.last_active, 0);
    }

    #[tokio::test]
    async fn live_and_offline_sessions_are_untouched() {
        let (store, _clock, reaper) = setup(10_000);
        let live = SessionRecord::online(0, 8_000);
        let done = SessionRecord::offline(0, 2_000);
        store.write(&session_path("live"), live.to_value()).unwrap();
        store.write(&session_path("done"), done.to_value()).unwrap();

        let report = reaper.scan_and_reap().await;

        assert!(report.reaped.is_empty());
        assert_eq!(read(&store, "live"), live);
        assert_eq!(read(&store, "done"), done);
    }

    #[tokio::test]
    async fn every_stale_record_goes_offline() {
        let (store, _clock, reaper) = setup(100_000);
        for (i, last) in [0i64, 10_000, 50_000, 94_000, 96_000].iter().enumerate() {
            store
                .write(&session_path(&format!("s{i}")), SessionRecord::online(0, *last).to_value())
                .unwrap();
        }

        let report = reaper.scan_and_reap().await;
        assert_eq!(report.reaped.len(), 4);

        let sessions = parse_sessions(store.read(SESSIONS_ROOT).unwrap().as_ref());
        for (id, record) in sessions {
            if id == "s4" {
                assert!(record.is_online());
            } else {
                assert_eq!(record.status, SessionStatus::Offline, "{id}");
                assert!(record.end_time.unwrap() >= record.start_time);
            }
        }
    }

    #[tokio::test]
    async fn malformed_records_are_skipped() {
        let (store, _clock, reaper) = setup(10_000);
        store.write("sessions/junk", json!({"hello": "world"})).unwrap();
        let report = reaper.scan_and_reap().await;
        assert_eq!(report.scanned, 0);
        assert_eq!(store.read("sessions/junk").unwrap(), Some(json!({"hello": "world"})));
    }

    #[tokio::test]
    async fn read_failure_yields_empty_report() {
        let store = MemoryStore::new();
        let client = store.client();
        client.disconnect();
        let reaper = SessionReaper::new(
            Arc::new(client),
            Arc::new(ManualClock::new(0, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())),
            Duration::from_secs(5),
        );
        assert_eq!(reaper.scan_and_reap().await, ReapReport::default());
    }

    #[tokio::test(start_paused = true)]
    async fn interval_scans_catch_late_staleness() {
        let (store, clock, reaper) = setup(0);
        store
            .write(&session_path("A"), SessionRecord::online(0, 0).to_value())
            .unwrap();

        let handle = reaper.spawn_interval(Duration::from_millis(10_000));

        // First scan lands at t=10000; the record has been silent 10s.
        clock.set_millis(10_000);
        tokio::time::sleep(Duration::from_millis(10_001)).await;
        assert_eq!(read(&store, "A").status, SessionStatus::Offline);
        assert_eq!(read(&store, "A").end_time, Some(10_000));
        handle.abort();
    }
}
