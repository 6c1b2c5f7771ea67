// libs/appointment-cell/src/interval.rs
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Half-open interval `[start, end)` in clinic-local time.
///
/// Every conflict and availability check in the workspace goes through
/// `overlaps` so the boundary semantics cannot drift between callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSlot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeSlot {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    pub fn from_start(date: NaiveDate, time: NaiveTime, duration_minutes: i64) -> Self {
        let start = date.and_time(time);
        Self {
            start,
            end: start + Duration::minutes(duration_minutes),
        }
    }

    /// Strict overlap: touching endpoints do not overlap, so back-to-back
    /// appointments are never a conflict.
    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Intersect with the day `[00:00, 24:00)`. A block spilling over from
    /// the previous day starts at the day's midnight; one running into the
    /// next day ends at the following midnight.
    pub fn clip_to_day(&self, date: NaiveDate) -> Option<TimeSlot> {
        let day_start = date.and_time(NaiveTime::MIN);
        let day_end = day_start + Duration::days(1);

        let start = self.start.max(day_start);
        let end = self.end.min(day_end);

        if start < end {
            Some(TimeSlot { start, end })
        } else {
            None
        }
    }
}
