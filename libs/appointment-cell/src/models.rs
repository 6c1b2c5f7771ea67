// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_models::error::ValidationErrors;

use crate::interval::TimeSlot;

pub const MIN_DURATION_MINUTES: i32 = 15;
pub const MAX_DURATION_MINUTES: i32 = 240;
pub const DEFAULT_DURATION_MINUTES: i32 = 30;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// A booked appointment. Patient, owner, veterinarian and creator ids are
/// opaque references into other services; nothing here assumes they resolve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub owner_id: Uuid,
    pub veterinarian_id: Uuid,
    pub created_by: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub duration_minutes: i32,
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub priority: Priority,
    pub reason: String,
    pub notes: Option<String>,
    pub contact_phone: String,
    pub reminder_sent: bool,
    pub confirmation_required: bool,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// The `[start, end)` interval this appointment occupies.
    pub fn slot(&self) -> TimeSlot {
        TimeSlot::from_start(
            self.appointment_date,
            self.appointment_time,
            self.duration_minutes as i64,
        )
    }

    pub fn start_datetime(&self) -> NaiveDateTime {
        self.appointment_date.and_time(self.appointment_time)
    }

    pub fn end_datetime(&self) -> NaiveDateTime {
        self.slot().end
    }

    pub fn is_past(&self, now: NaiveDateTime) -> bool {
        self.start_datetime() < now
    }

    /// Whether this appointment still counts toward slot and conflict
    /// occupancy.
    pub fn is_occupying(&self) -> bool {
        self.status.is_occupying()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Completed, cancelled and no-show appointments free their slot.
    pub fn is_occupying(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Scheduled
                | AppointmentStatus::Confirmed
                | AppointmentStatus::InProgress
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    Consultation,
    Vaccination,
    Surgery,
    Emergency,
    FollowUp,
    Grooming,
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentType::Consultation => write!(f, "consultation"),
            AppointmentType::Vaccination => write!(f, "vaccination"),
            AppointmentType::Surgery => write!(f, "surgery"),
            AppointmentType::Emergency => write!(f, "emergency"),
            AppointmentType::FollowUp => write!(f, "follow_up"),
            AppointmentType::Grooming => write!(f, "grooming"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Emergency,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Emergency => write!(f, "emergency"),
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub owner_id: Uuid,
    pub veterinarian_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub duration_minutes: Option<i32>,
    pub appointment_type: Option<AppointmentType>,
    pub priority: Option<Priority>,
    pub reason: String,
    pub notes: Option<String>,
    pub contact_phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub appointment_date: Option<NaiveDate>,
    pub appointment_time: Option<NaiveTime>,
    pub duration_minutes: Option<i32>,
    pub appointment_type: Option<AppointmentType>,
    pub priority: Option<Priority>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub contact_phone: Option<String>,
}

impl UpdateAppointmentRequest {
    /// True when the update moves the appointment in time and the conflict
    /// rules have to run again.
    pub fn reschedules(&self) -> bool {
        self.appointment_date.is_some()
            || self.appointment_time.is_some()
            || self.duration_minutes.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentQueryParams {
    pub veterinarian_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub appointment_type: Option<AppointmentType>,
    pub priority: Option<Priority>,
    pub appointment_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

// ==============================================================================
// AGENDA MODELS
// ==============================================================================

/// A block interval clipped to one day, for agenda display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockedPeriod {
    pub start: String,
    pub end: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayAgenda {
    pub date: NaiveDate,
    pub veterinarian_id: Uuid,
    pub appointments: Vec<Appointment>,
    /// Free fixed-grid slot start times, formatted HH:MM.
    pub available_slots: Vec<String>,
    pub blocked_periods: Vec<BlockedPeriod>,
}

// ==============================================================================
// VALIDATION INPUT
// ==============================================================================

/// What the Conflict Validator judges: a candidate (vet, patient, date, time,
/// duration), optionally excluding the appointment being updated.
#[derive(Debug, Clone)]
pub struct ProposedAppointment {
    pub veterinarian_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub duration_minutes: i32,
    pub exclude_appointment_id: Option<Uuid>,
}

impl ProposedAppointment {
    pub fn slot(&self) -> TimeSlot {
        TimeSlot::from_start(
            self.appointment_date,
            self.appointment_time,
            self.duration_minutes as i64,
        )
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("{0}")]
    InvalidTransition(String),

    #[error("The slot is being booked by another request")]
    SlotLocked,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appointment(status: AppointmentStatus) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            veterinarian_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            appointment_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            appointment_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            duration_minutes: 45,
            appointment_type: AppointmentType::Consultation,
            status,
            priority: Priority::Normal,
            reason: "Limping on front leg".to_string(),
            notes: None,
            contact_phone: "555-0100".to_string(),
            reminder_sent: false,
            confirmation_required: true,
            confirmed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn end_datetime_follows_duration() {
        let apt = appointment(AppointmentStatus::Scheduled);
        assert_eq!(
            apt.end_datetime(),
            NaiveDate::from_ymd_opt(2024, 6, 1)
                .unwrap()
                .and_hms_opt(9, 45, 0)
                .unwrap()
        );
    }

    #[test]
    fn occupying_statuses() {
        assert!(appointment(AppointmentStatus::Scheduled).is_occupying());
        assert!(appointment(AppointmentStatus::Confirmed).is_occupying());
        assert!(appointment(AppointmentStatus::InProgress).is_occupying());
        assert!(!appointment(AppointmentStatus::Completed).is_occupying());
        assert!(!appointment(AppointmentStatus::Cancelled).is_occupying());
        assert!(!appointment(AppointmentStatus::NoShow).is_occupying());
    }

    #[test]
    fn status_round_trips_as_snake_case() {
        let json = serde_json::to_string(&AppointmentStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let status: AppointmentStatus = serde_json::from_str("\"no_show\"").unwrap();
        assert_eq!(status, AppointmentStatus::NoShow);
    }

    #[test]
    fn update_request_detects_rescheduling() {
        let noop = UpdateAppointmentRequest {
            appointment_date: None,
            appointment_time: None,
            duration_minutes: None,
            appointment_type: None,
            priority: None,
            reason: Some("Updated reason".to_string()),
            notes: None,
            contact_phone: None,
        };
        assert!(!noop.reschedules());

        let moved = UpdateAppointmentRequest {
            appointment_time: Some(NaiveTime::from_hms_opt(10, 0, 0).unwrap()),
            ..noop
        };
        assert!(moved.reschedules());
    }
}
