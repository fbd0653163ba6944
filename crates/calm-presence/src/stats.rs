//! Daily peak of concurrent online sessions.

use std::sync::Arc;

use calm_common::Clock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::record::{
    daily_stat_path, parse_daily_stat, parse_sessions, DailyStat, SessionRecord, SESSIONS_ROOT,
};
use crate::store::RealtimeStore;

/// Number of records currently `online`.
pub fn count_online(sessions: &[(String, SessionRecord)]) -> u32 {
    let online = sessions.iter().filter(|(_, r)| r.is_online()).count();
    u32::try_from(online).unwrap_or(u32::MAX)
}

/// Ratchets `dailyStats/<today>.maxOnline` upward as the online count grows.
///
/// The read of the stored value and the write of a higher one are separate
/// store calls, so two aggregators racing on the same day can lose the
/// larger of two simultaneous peaks. The next notification usually
/// corrects it.
#[derive(Clone)]
pub struct DailyStatsAggregator {
    store: Arc<dyn RealtimeStore>,
    clock: Arc<dyn Clock>,
}

impl DailyStatsAggregator {
    pub fn new(store: Arc<dyn RealtimeStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Apply one `sessions` snapshot. Returns the stat written, if any.
    pub async fn recompute(&self, sessions: &[(String, SessionRecord)]) -> Option<DailyStat> {
        let online = count_online(sessions);
        let date = self.clock.date_key();
        let path = daily_stat_path(&date);

        let stored = match self.store.get(&path).await {
            Ok(value) => parse_daily_stat(&date, value.as_ref()),
            Err(e) => {
                warn!(date = %date, error = %e, "Failed to read daily stat");
                return None;
            }
        };

        if let Some(current) = &stored {
            if online <= current.max_online {
                return None;
            }
        }

        let stat = DailyStat {
            date,
            max_online: online,
        };
        match self.store.set(&path, stat.to_value()).await {
            Ok(()) => {
                info!(
                    date = %stat.date,
                    max_online = stat.max_online,
                    previous = stored.map(|s| s.max_online),
                    "Daily peak raised"
                );
                Some(stat)
            }
            Err(e) => {
                warn!(date = %stat.date, error = %e, "Failed to write daily stat");
                None
            }
        }
    }

    /// Subscribe to `sessions` and recompute on every notification,
    /// including the initial one. Runs until aborted or the subscription
    /// ends.
    pub fn update_daily_stats(&self) -> JoinHandle<()> {
        let aggregator = self.clone();
        tokio::spawn(async move {
            let mut updates = match aggregator.store.subscribe(SESSIONS_ROOT).await {
                Ok(rx) => rx,
                Err(e) => {
                    warn!(error = %e, "Daily stats subscription failed");
                    return;
                }
            };
            while let Some(snapshot) = updates.recv().await {
                let sessions = parse_sessions(snapshot.as_ref());
                aggregator.recompute(&sessions).await;
            }
            debug!("Daily stats subscription ended");
        })
    }
}
