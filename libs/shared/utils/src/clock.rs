use chrono::{Local, NaiveDate, NaiveDateTime};
use std::sync::Arc;

/// Source of "now" in clinic-local wall time. Appointment dates and times are
/// stored without an offset, so every past-date check goes through this trait
/// instead of reading the wall clock directly.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Production clock: the host's local time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Test clock pinned to a single instant.
#[derive(Debug, Clone)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}
