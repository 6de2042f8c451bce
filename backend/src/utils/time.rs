use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

pub const UNKNOWN_DATE_LABEL: &str = "Unknown Date";
pub const UNKNOWN_TIME_LABEL: &str = "Unknown Time";

/// Source of wall-clock time for status evaluation and sweeps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests; clones share the same instant.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Long date label, e.g. "Monday, January 1, 2024".
pub fn date_label(at: Option<DateTime<Utc>>, tz: &Tz) -> String {
    match at {
        Some(at) => at.with_timezone(tz).format("%A, %B %-d, %Y").to_string(),
        None => UNKNOWN_DATE_LABEL.to_string(),
    }
}

/// 24-hour clock label, e.g. "09:05".
pub fn time_label(at: Option<DateTime<Utc>>, tz: &Tz) -> String {
    match at {
        Some(at) => at.with_timezone(tz).format("%H:%M").to_string(),
        None => UNKNOWN_TIME_LABEL.to_string(),
    }
}
