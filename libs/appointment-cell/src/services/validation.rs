// libs/appointment-cell/src/services/validation.rs
use chrono::{Datelike, NaiveDateTime};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use schedule_cell::models::{day_of_week_index, AppointmentBlock, VeterinarianSchedule};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::error::ValidationErrors;
use shared_utils::clock::Clock;

use crate::models::{
    Appointment, AppointmentError, ProposedAppointment, MAX_DURATION_MINUTES,
    MIN_DURATION_MINUTES,
};

const OCCUPYING_STATUSES: &str = "status=in.(scheduled,confirmed,in_progress)";

/// Checks a proposed appointment against every booking rule. The rules run
/// independently and their failures are gathered into one field-keyed map, so
/// a caller sees everything wrong with the request at once.
pub struct ConflictValidator {
    supabase: Arc<SupabaseClient>,
    clock: Arc<dyn Clock>,
}

impl ConflictValidator {
    pub fn new(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            clock,
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>, clock: Arc<dyn Clock>) -> Self {
        Self { supabase, clock }
    }

    pub async fn validate(
        &self,
        proposal: &ProposedAppointment,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        debug!(
            "Validating proposed appointment for veterinarian {} on {} at {}",
            proposal.veterinarian_id, proposal.appointment_date, proposal.appointment_time
        );

        let schedule = self.fetch_schedule(proposal, auth_token).await?;
        let blocks = self.fetch_overlapping_blocks(proposal, auth_token).await?;
        let vet_appointments = self.fetch_vet_appointments(proposal, auth_token).await?;
        let patient_appointments = self.fetch_patient_appointments(proposal, auth_token).await?;

        let errors = evaluate_booking_rules(
            proposal,
            self.clock.now(),
            schedule.as_ref(),
            &blocks,
            &vet_appointments,
            &patient_appointments,
        );

        if !errors.is_empty() {
            warn!(
                "Booking rejected for veterinarian {}: {}",
                proposal.veterinarian_id, errors
            );
            return Err(AppointmentError::Validation(errors));
        }

        Ok(())
    }

    /// Active working-hours row for the proposal's weekday, if any.
    async fn fetch_schedule(
        &self,
        proposal: &ProposedAppointment,
        auth_token: &str,
    ) -> Result<Option<VeterinarianSchedule>, AppointmentError> {
        let day = day_of_week_index(proposal.appointment_date.weekday());
        let path = format!(
            "/rest/v1/veterinarian_schedules?veterinarian_id=eq.{}&day_of_week=eq.{}&is_active=eq.true",
            proposal.veterinarian_id, day
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse schedule: {}", e)))
    }

    async fn fetch_overlapping_blocks(
        &self,
        proposal: &ProposedAppointment,
        auth_token: &str,
    ) -> Result<Vec<AppointmentBlock>, AppointmentError> {
        let slot = proposal.slot();
        let path = format!(
            "/rest/v1/appointment_blocks?veterinarian_id=eq.{}&is_active=eq.true&start_datetime=lt.{}&end_datetime=gt.{}",
            proposal.veterinarian_id,
            slot.end.format("%Y-%m-%dT%H:%M:%S"),
            slot.start.format("%Y-%m-%dT%H:%M:%S")
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AppointmentBlock>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse blocks: {}", e)))
    }

    async fn fetch_vet_appointments(
        &self,
        proposal: &ProposedAppointment,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut query_parts = vec![
            format!("veterinarian_id=eq.{}", proposal.veterinarian_id),
            format!("appointment_date=eq.{}", proposal.appointment_date),
            OCCUPYING_STATUSES.to_string(),
        ];
        if let Some(exclude_id) = proposal.exclude_appointment_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }
        query_parts.push("order=appointment_time.asc".to_string());

        self.fetch_appointments(&query_parts, auth_token).await
    }

    async fn fetch_patient_appointments(
        &self,
        proposal: &ProposedAppointment,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut query_parts = vec![
            format!("patient_id=eq.{}", proposal.patient_id),
            format!("appointment_date=eq.{}", proposal.appointment_date),
            format!(
                "appointment_time=eq.{}",
                proposal.appointment_time.format("%H:%M:%S")
            ),
            OCCUPYING_STATUSES.to_string(),
        ];
        if let Some(exclude_id) = proposal.exclude_appointment_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }

        self.fetch_appointments(&query_parts, auth_token).await
    }

    async fn fetch_appointments(
        &self,
        query_parts: &[String],
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!("/rest/v1/appointments?{}", query_parts.join("&"));

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| {
                AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e))
            })
    }
}

/// Pure rule evaluation over pre-fetched rows. Each rule reports under its
/// own field key; none of them short-circuits the others.
pub fn evaluate_booking_rules(
    proposal: &ProposedAppointment,
    now: NaiveDateTime,
    schedule: Option<&VeterinarianSchedule>,
    blocks: &[AppointmentBlock],
    vet_appointments: &[Appointment],
    patient_appointments: &[Appointment],
) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    let slot = proposal.slot();

    if proposal.duration_minutes < MIN_DURATION_MINUTES
        || proposal.duration_minutes > MAX_DURATION_MINUTES
    {
        errors.add(
            "duration_minutes",
            format!(
                "Duration must be between {} and {} minutes",
                MIN_DURATION_MINUTES, MAX_DURATION_MINUTES
            ),
        );
    }

    if slot.start < now {
        errors.add("appointment_date", "Appointments cannot be scheduled in the past");
    }

    match schedule {
        None => {
            errors.add(
                "veterinarian_id",
                "The veterinarian has no schedule configured for this day",
            );
        }
        Some(schedule) => {
            // Start time only; whether start + duration runs past closing is
            // deliberately not checked here.
            if proposal.appointment_time < schedule.start_time
                || proposal.appointment_time > schedule.end_time
            {
                errors.add(
                    "appointment_time",
                    format!(
                        "The veterinarian is not available at this time. Working hours: {}-{}",
                        schedule.start_time.format("%H:%M"),
                        schedule.end_time.format("%H:%M")
                    ),
                );
            }
        }
    }

    let blocked = blocks.iter().any(|block| {
        block.is_active
            && crate::interval::TimeSlot::new(block.start_datetime, block.end_datetime)
                .overlaps(&slot)
    });
    if blocked {
        errors.add(
            "appointment_time",
            "The veterinarian's schedule is blocked during this period",
        );
    }

    let conflicting = vet_appointments.iter().find(|apt| {
        apt.is_occupying()
            && Some(apt.id) != proposal.exclude_appointment_id
            && apt.slot().overlaps(&slot)
    });
    if let Some(apt) = conflicting {
        errors.add(
            "appointment_time",
            format!(
                "Conflicts with an existing appointment from {} to {}",
                apt.appointment_time.format("%H:%M"),
                apt.end_datetime().format("%H:%M")
            ),
        );
    }

    // Same patient, literally the same date and start time, any veterinarian
    let double_booked = patient_appointments.iter().any(|apt| {
        apt.is_occupying()
            && Some(apt.id) != proposal.exclude_appointment_id
            && apt.appointment_date == proposal.appointment_date
            && apt.appointment_time == proposal.appointment_time
    });
    if double_booked {
        errors.add(
            "appointment_time",
            "The patient already has an appointment at this time",
        );
    }

    errors
}
