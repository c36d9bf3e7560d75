use std::sync::Mutex;

use chrono::{NaiveDate, Utc};

/// Source of "today" for every lifecycle operation.
///
/// Operations never read the ambient system time directly; they go through a
/// `Clock` so registration-before-start and deferral/resume scenarios can be
/// replayed deterministically.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Production clock backed by the system time in UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Settable clock used by tests and historical replays.
#[derive(Debug)]
pub struct FixedClock {
    today: Mutex<NaiveDate>,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Mutex::new(today),
        }
    }

    /// Advance (or rewind) the reported date.
    pub fn set(&self, today: NaiveDate) {
        let mut guard = self
            .today
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = today;
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self
            .today
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
