// libs/schedule-cell/src/models.rs
use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::error::ValidationErrors;

// ==============================================================================
// WORKING-HOURS REGISTRY
// ==============================================================================

/// One active row per (veterinarian, weekday). A veterinarian without an
/// active row for a weekday is fully unavailable that day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VeterinarianSchedule {
    pub id: Uuid,
    pub veterinarian_id: Uuid,
    /// 0 = Sunday .. 6 = Saturday
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Map a calendar weekday onto the stored 0..=6 index.
pub fn day_of_week_index(weekday: Weekday) -> i32 {
    match weekday {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduleRequest {
    pub veterinarian_id: Uuid,
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateScheduleRequest {
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleQuery {
    pub veterinarian_id: Option<Uuid>,
    pub day_of_week: Option<i32>,
    pub is_active: Option<bool>,
}

// ==============================================================================
// BLOCK REGISTRY
// ==============================================================================

/// Ad-hoc unavailability (vacation, meeting) overriding working hours; may
/// span several calendar days. Soft-disabled via `is_active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentBlock {
    pub id: Uuid,
    pub veterinarian_id: Uuid,
    pub start_datetime: NaiveDateTime,
    pub end_datetime: NaiveDateTime,
    pub reason: String,
    pub is_active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBlockRequest {
    pub veterinarian_id: Uuid,
    pub start_datetime: NaiveDateTime,
    pub end_datetime: NaiveDateTime,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateBlockRequest {
    pub start_datetime: Option<NaiveDateTime>,
    pub end_datetime: Option<NaiveDateTime>,
    pub reason: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockQuery {
    pub veterinarian_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("Schedule not found")]
    NotFound,

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
