//! Persisted record shapes and their store paths.
//!
//! `sessions/<id>` holds a [`SessionRecord`]; `dailyStats/<YYYY-MM-DD>`
//! holds a [`DailyStat`]. Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Parent path of all session records.
pub const SESSIONS_ROOT: &str = "sessions";

/// Parent path of all daily statistics.
pub const DAILY_STATS_ROOT: &str = "dailyStats";

pub fn session_path(session_id: &str) -> String {
    format!("{SESSIONS_ROOT}/{session_id}")
}

pub fn daily_stat_path(date_key: &str) -> String {
    format!("{DAILY_STATS_ROOT}/{date_key}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Online,
    Offline,
}

/// One tab's presence record.
///
/// `online` records carry no `endTime`; `offline` records carry an
/// `endTime` no earlier than `startTime`. The constructors below are the
/// only way this crate builds records, so both hold for everything it
/// writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub last_active: i64,
    pub status: SessionStatus,
    pub start_time: i64,
    #[serde(default)]
    pub end_time: Option<i64>,
}

impl SessionRecord {
    pub fn online(start_time: i64, last_active: i64) -> Self {
        Self {
            last_active,
            status: SessionStatus::Online,
            start_time,
            end_time: None,
        }
    }

    pub fn offline(start_time: i64, at: i64) -> Self {
        Self {
            last_active: at,
            status: SessionStatus::Offline,
            start_time,
            end_time: Some(at.max(start_time)),
        }
    }

    /// Force this record offline at `now`, keeping `lastActive` and `startTime`.
    pub fn reaped(&self, now: i64) -> Self {
        Self {
            status: SessionStatus::Offline,
            end_time: Some(now.max(self.start_time)),
            ..self.clone()
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == SessionStatus::Online
    }

    /// Online and silent for strictly longer than `threshold_ms`.
    pub fn is_stale(&self, now: i64, threshold_ms: i64) -> bool {
        self.is_online() && now.saturating_sub(self.last_active) > threshold_ms
    }

    pub fn to_value(&self) -> serde_json::Value {
        // Numbers and a unit enum only; serialization cannot fail.
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Peak concurrent online sessions for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStat {
    pub date: String,
    pub max_online: u32,
}

impl DailyStat {
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Decode the children of `sessions` into `(id, record)` pairs.
///
/// Entries that are not valid session records are skipped.
pub fn parse_sessions(value: Option<&serde_json::Value>) -> Vec<(String, SessionRecord)> {
    let Some(map) = value.and_then(|v| v.as_object()) else {
        return Vec::new();
    };
    map.iter()
        .filter_map(
            |(id, raw)| match serde_json::from_value::<SessionRecord>(raw.clone()) {
                Ok(record) => Some((id.clone(), record)),
                Err(e) => {
                    debug!(session = %id, error = %e, "Skipping malformed session record");
                    None
                }
            },
        )
        .collect()
}

/// Decode the stat stored under `dailyStats/<date_key>`.
///
/// Only `maxOnline` matters: any JSON number is accepted (fractions
/// truncate, negatives read as zero) and a missing or mismatched `date`
/// is ignored. The stat reads as absent only when there is no number.
pub fn parse_daily_stat(date_key: &str, value: Option<&serde_json::Value>) -> Option<DailyStat> {
    let raw = value?.get("maxOnline");
    let Some(max_online) = raw.and_then(read_count) else {
        debug!(date = %date_key, "Ignoring daily stat without a numeric maxOnline");
        return None;
    };
    Some(DailyStat {
        date: date_key.to_string(),
        max_online,
    })
}

fn read_count(raw: &serde_json::Value) -> Option<u32> {
    if let Some(n) = raw.as_u64() {
        return Some(u32::try_from(n).unwrap_or(u32::MAX));
    }
    // Float-to-int `as` saturates.
    raw.as_f64().map(|f| f.max(0.0) as u32)
}
