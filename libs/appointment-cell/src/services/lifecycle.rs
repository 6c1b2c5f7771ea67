// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus};

/// The appointment state machine:
/// scheduled -> confirmed -> in_progress -> completed, with cancellation
/// allowed from any non-terminal state. No transition re-runs the conflict
/// rules; a confirmed appointment is never re-checked against blocks created
/// after booking.
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    pub fn confirm(&self, current: &AppointmentStatus) -> Result<(), AppointmentError> {
        self.require(
            current,
            AppointmentStatus::Scheduled,
            "Only scheduled appointments can be confirmed",
        )
    }

    pub fn start(&self, current: &AppointmentStatus) -> Result<(), AppointmentError> {
        self.require(
            current,
            AppointmentStatus::Confirmed,
            "Only confirmed appointments can be started",
        )
    }

    pub fn complete(&self, current: &AppointmentStatus) -> Result<(), AppointmentError> {
        self.require(
            current,
            AppointmentStatus::InProgress,
            "Only appointments in progress can be completed",
        )
    }

    /// Cancellation is legal from any state that is not already settled.
    pub fn cancel(&self, current: &AppointmentStatus) -> Result<(), AppointmentError> {
        if matches!(
            current,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled
        ) {
            warn!("Rejected cancellation of {} appointment", current);
            return Err(AppointmentError::InvalidTransition(
                "Completed or already cancelled appointments cannot be cancelled".to_string(),
            ));
        }
        Ok(())
    }

    /// Every status reachable from `current` through the explicit operations.
    /// No-show is excluded: it is a data-entry mark, not a transition.
    pub fn valid_transitions(&self, current: &AppointmentStatus) -> Vec<AppointmentStatus> {
        match current {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::InProgress,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::InProgress => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow => vec![],
        }
    }

    fn require(
        &self,
        current: &AppointmentStatus,
        expected: AppointmentStatus,
        message: &str,
    ) -> Result<(), AppointmentError> {
        debug!("Validating transition from {}", current);
        if *current == expected {
            Ok(())
        } else {
            warn!("Invalid transition attempted from {}: {}", current, message);
            Err(AppointmentError::InvalidTransition(message.to_string()))
        }
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}
