use chrono::{Local, NaiveDate, Utc};
use std::sync::Mutex;

/// Source of "today" and "now" for everything that stamps or ages data.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;

    /// Unix milliseconds.
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Manually driven clock. `now_millis` ticks by one on every call so
/// successive writes get distinct timestamps.
#[derive(Debug)]
pub struct FixedClock {
    inner: Mutex<(NaiveDate, i64)>,
}

impl FixedClock {
    pub fn new(today: NaiveDate, now_millis: i64) -> Self {
        Self {
            inner: Mutex::new((today, now_millis)),
        }
    }

    pub fn set_today(&self, today: NaiveDate) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.0 = today;
        }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.inner
            .lock()
            .map(|inner| inner.0)
            .unwrap_or(NaiveDate::MIN)
    }

    fn now_millis(&self) -> i64 {
        match self.inner.lock() {
            Ok(mut inner) => {
                inner.1 += 1;
                inner.1
            }
            Err(_) => 0,
        }
    }
}
