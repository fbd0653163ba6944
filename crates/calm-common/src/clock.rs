//! Wall-clock abstraction shared by the presence components.
//!
//! Timestamps are client-clock epoch milliseconds; date keys come from the
//! local calendar. No skew compensation is attempted.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use chrono::{Local, NaiveDate, Utc};

/// Format used for `dailyStats/<date>` keys.
pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

pub trait Clock: Send + Sync {
    /// Current time in epoch milliseconds.
    fn now_millis(&self) -> i64;

    /// Today's date on the local calendar.
    fn today(&self) -> NaiveDate;

    /// Today's `YYYY-MM-DD` key.
    fn date_key(&self) -> String {
        self.today().format(DATE_KEY_FORMAT).to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Hand-driven clock for tests and replay tooling.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
    date: RwLock<NaiveDate>,
}

impl ManualClock {
    pub fn new(millis: i64, date: NaiveDate) -> Self {
        Self {
            millis: AtomicI64::new(millis),
            date: RwLock::new(date),
        }
    }

    pub fn set_millis(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn set_date(&self, date: NaiveDate) {
        *self.date.write().unwrap_or_else(|e| e.into_inner()) = date;
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }

    fn today(&self) -> NaiveDate {
        *self.date.read().unwrap_or_else(|e| e.into_inner())
    }
}
