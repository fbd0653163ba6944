//! Lifecycle of one session's presence record.
//!
//! [`PresenceTracker::start`] writes the record online whenever the store
//! connection comes up, arms a disconnect hook that flips it offline,
//! refreshes `lastActive` on a heartbeat, and runs the reaper and the
//! daily-stats aggregator alongside. [`PresenceHandle::stop`] ends all of
//! it with a graceful offline write.

mod types;
mod writer;

pub use types::PresenceSettings;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use calm_common::{Clock, SessionId};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::reaper::SessionReaper;
use crate::record::{session_path, SessionRecord};
use crate::stats::DailyStatsAggregator;
use crate::store::{DisconnectAction, RealtimeStore};
use writer::{spawn_writer, WriteOp};

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Timestamps owned by one running tracker.
struct SessionClock {
    clock: Arc<dyn Clock>,
    start_time: i64,
    last_active: AtomicI64,
}

impl SessionClock {
    fn new(clock: Arc<dyn Clock>) -> Self {
        let start_time = clock.now_millis();
        Self {
            clock,
            start_time,
            last_active: AtomicI64::new(start_time),
        }
    }

    /// Current time, clamped so it never precedes an earlier stamp.
    fn stamp(&self) -> i64 {
        let now = self.clock.now_millis();
        let previous = self.last_active.fetch_max(now, Ordering::SeqCst);
        previous.max(now)
    }

    fn online(&self) -> SessionRecord {
        SessionRecord::online(self.start_time, self.stamp())
    }

    fn offline(&self) -> SessionRecord {
        SessionRecord::offline(self.start_time, self.stamp())
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

pub struct PresenceTracker {
    store: Arc<dyn RealtimeStore>,
    clock: Arc<dyn Clock>,
    settings: PresenceSettings,
}

impl PresenceTracker {
    pub fn new(
        store: Arc<dyn RealtimeStore>,
        clock: Arc<dyn Clock>,
        settings: PresenceSettings,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    /// Begin tracking `session_id`. All work runs on background tasks until
    /// the returned handle is stopped or dropped.
    pub fn start(&self, session_id: SessionId) -> PresenceHandle {
        let path = session_path(session_id.as_str());
        let session = Arc::new(SessionClock::new(Arc::clone(&self.clock)));
        let (writes, writer) = spawn_writer(Arc::clone(&self.store));

        info!(
            session = %session_id,
            start_time = session.start_time,
            "Presence tracking started"
        );

        let watcher = tokio::spawn(watch_connection(
            self.store.connection_state(),
            path.clone(),
            Arc::clone(&session),
            writes.clone(),
        ));
        let heartbeat = tokio::spawn(heartbeat_loop(
            self.store.connection_state(),
            self.settings,
            path.clone(),
            Arc::clone(&session),
            writes.clone(),
        ));

        let aggregator =
            DailyStatsAggregator::new(Arc::clone(&self.store), Arc::clone(&self.clock))
                .update_daily_stats();
        let reaper = SessionReaper::new(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            self.settings.stale_threshold,
        )
        .spawn_interval(self.settings.reaper_interval);

        PresenceHandle {
            session_id,
            path,
            session,
            writes: Some(writes),
            writer: Some(writer),
            tasks: vec![heartbeat, reaper, watcher, aggregator],
        }
    }
}

/// Writes the record online and arms the offline hook whenever the
/// connection state reads `true`: an already-live connection at start and
/// every later wakeup. The channel collapses a down-then-up flip between two
/// polls into one `true`, so each such wakeup is treated as a reconnect.
async fn watch_connection(
    mut state: watch::Receiver<bool>,
    path: String,
    session: Arc<SessionClock>,
    writes: mpsc::UnboundedSender<WriteOp>,
) {
    loop {
        if *state.borrow_and_update() {
            let online = session.online();
            debug!(path = %path, last_active = online.last_active, "Connection up, marking online");
            let _ = writes.send(WriteOp::Set {
                path: path.clone(),
                value: online.to_value(),
            });
            // Stamped now, not when the hook eventually fires.
            let _ = writes.send(WriteOp::ArmHook {
                path: path.clone(),
                action: DisconnectAction::Set(session.offline().to_value()),
            });
        } else {
            debug!(path = %path, "Connection down");
        }

        if state.changed().await.is_err() {
            debug!(path = %path, "Connection state closed, watcher exiting");
            return;
        }
    }
}

async fn heartbeat_loop(
    state: watch::Receiver<bool>,
    settings: PresenceSettings,
    path: String,
    session: Arc<SessionClock>,
    writes: mpsc::UnboundedSender<WriteOp>,
) {
    let period = settings.heartbeat_interval;
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if !*state.borrow() {
            debug!(path = %path, "Skipping heartbeat while disconnected");
            continue;
        }
        let record = session.online();
        if writes
            .send(WriteOp::Set {
                path: path.clone(),
                value: record.to_value(),
            })
            .is_err()
        {
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Running tracker. Dropping it cancels the timers without the graceful
/// offline write; the disconnect hook then covers the record.
pub struct PresenceHandle {
    session_id: SessionId,
    path: String,
    session: Arc<SessionClock>,
    writes: Option<mpsc::UnboundedSender<WriteOp>>,
    writer: Option<JoinHandle<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl PresenceHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Cancel every timer, write the record offline, and disarm the hook.
    ///
    /// Returns once all queued writes have been applied (or dropped), so no
    /// heartbeat can land after the offline record.
    pub async fn stop(mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
            // Wait so no cancelled task still holds a queued write.
            let _ = task.await;
        }

        let offline = self.session.offline();
        if let Some(writes) = self.writes.take() {
            let _ = writes.send(WriteOp::Set {
                path: self.path.clone(),
                value: offline.to_value(),
            });
            let _ = writes.send(WriteOp::DisarmHook {
                path: self.path.clone(),
            });
        }

        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.await {
                warn!(session = %self.session_id, error = %e, "Presence writer ended abnormally");
            }
        }

        info!(
            session = %self.session_id,
            end_time = ?offline.end_time,
            "Presence tracking stopped"
        );
    }
}

impl Drop for PresenceHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests;
