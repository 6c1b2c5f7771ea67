// libs/appointment-cell/src/services/booking.rs
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_utils::clock::{system_clock, Clock};

use crate::models::{
    Appointment, AppointmentError, AppointmentQueryParams, BookAppointmentRequest,
    ProposedAppointment, UpdateAppointmentRequest, DEFAULT_DURATION_MINUTES,
};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::locking::SchedulingLockService;
use crate::services::validation::ConflictValidator;

/// Delay before the single retry when the per-day lock is contended.
const LOCK_RETRY_DELAY_MS: u64 = 150;

/// Books, searches, reschedules and transitions appointments. Every write
/// that could race another booking for the same veterinarian and day goes
/// through the scheduling lock.
pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    validator: ConflictValidator,
    lifecycle: AppointmentLifecycleService,
    locks: SchedulingLockService,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            validator: ConflictValidator::new(config, clock),
            lifecycle: AppointmentLifecycleService::new(),
            locks: SchedulingLockService::new(config),
        }
    }

    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        created_by: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let proposal = ProposedAppointment {
            veterinarian_id: request.veterinarian_id,
            patient_id: request.patient_id,
            appointment_date: request.appointment_date,
            appointment_time: request.appointment_time,
            duration_minutes: request.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES),
            exclude_appointment_id: None,
        };

        self.acquire_with_retry(request.veterinarian_id, request.appointment_date, auth_token)
            .await?;

        let result = self
            .validate_and_insert(&request, &proposal, created_by, auth_token)
            .await;

        if let Err(e) = self
            .locks
            .release(request.veterinarian_id, request.appointment_date, auth_token)
            .await
        {
            // The TTL reclaims an orphaned lock; the booking outcome stands.
            warn!("Failed to release scheduling lock: {}", e);
        }

        result
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .next()
            .ok_or(AppointmentError::NotFound)
            .and_then(|row| {
                serde_json::from_value(row).map_err(|e| {
                    AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e))
                })
            })
    }

    pub async fn search_appointments(
        &self,
        params: &AppointmentQueryParams,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut query_parts = Vec::new();

        if let Some(veterinarian_id) = params.veterinarian_id {
            query_parts.push(format!("veterinarian_id=eq.{}", veterinarian_id));
        }
        if let Some(patient_id) = params.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(owner_id) = params.owner_id {
            query_parts.push(format!("owner_id=eq.{}", owner_id));
        }
        if let Some(status) = params.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(appointment_type) = params.appointment_type {
            query_parts.push(format!("appointment_type=eq.{}", appointment_type));
        }
        if let Some(priority) = params.priority {
            query_parts.push(format!("priority=eq.{}", priority));
        }
        if let Some(date) = params.appointment_date {
            query_parts.push(format!("appointment_date=eq.{}", date));
        }
        if let Some(start) = params.start_date {
            query_parts.push(format!("appointment_date=gte.{}", start));
        }
        if let Some(end) = params.end_date {
            query_parts.push(format!("appointment_date=lte.{}", end));
        }
        query_parts.push("order=appointment_date.asc,appointment_time.asc".to_string());

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

    /// Update fields on an appointment. Moving it in time re-runs the full
    /// conflict validation under the scheduling lock, with the appointment
    /// itself excluded so it cannot collide with its own old slot.
    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let existing = self.get_appointment(appointment_id, auth_token).await?;
        let reschedules = request.reschedules();

        let proposal = ProposedAppointment {
            veterinarian_id: existing.veterinarian_id,
            patient_id: existing.patient_id,
            appointment_date: request.appointment_date.unwrap_or(existing.appointment_date),
            appointment_time: request.appointment_time.unwrap_or(existing.appointment_time),
            duration_minutes: request.duration_minutes.unwrap_or(existing.duration_minutes),
            exclude_appointment_id: Some(appointment_id),
        };

        let mut patch = serde_json::Map::new();
        if let Some(date) = request.appointment_date {
            patch.insert("appointment_date".to_string(), json!(date));
        }
        if let Some(time) = request.appointment_time {
            patch.insert(
                "appointment_time".to_string(),
                json!(time.format("%H:%M:%S").to_string()),
            );
        }
        if let Some(duration) = request.duration_minutes {
            patch.insert("duration_minutes".to_string(), json!(duration));
        }
        if let Some(appointment_type) = request.appointment_type {
            patch.insert("appointment_type".to_string(), json!(appointment_type));
        }
        if let Some(priority) = request.priority {
            patch.insert("priority".to_string(), json!(priority));
        }
        if let Some(reason) = request.reason {
            patch.insert("reason".to_string(), json!(reason));
        }
        if let Some(notes) = request.notes {
            patch.insert("notes".to_string(), json!(notes));
        }
        if let Some(contact_phone) = request.contact_phone {
            patch.insert("contact_phone".to_string(), json!(contact_phone));
        }
        patch.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        if !reschedules {
            return self
                .patch_appointment(appointment_id, Value::Object(patch), auth_token)
                .await;
        }

        // The write has to land while the lock is still held, or a
        // concurrent booking could validate and insert into the same slot
        // between this validation and the patch.
        self.acquire_with_retry(existing.veterinarian_id, proposal.appointment_date, auth_token)
            .await?;

        let result = match self.validator.validate(&proposal, auth_token).await {
            Ok(()) => {
                self.patch_appointment(appointment_id, Value::Object(patch), auth_token)
                    .await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = self
            .locks
            .release(existing.veterinarian_id, proposal.appointment_date, auth_token)
            .await
        {
            warn!("Failed to release scheduling lock: {}", e);
        }

        result
    }

    pub async fn delete_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        // 404 before delete so removing a missing row is visible to callers
        self.get_appointment(appointment_id, auth_token).await?;

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let _: Vec<Value> = self
            .supabase
            .request(Method::DELETE, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        info!("Deleted appointment {}", appointment_id);
        Ok(())
    }

    // ----- lifecycle transitions ------------------------------------------

    pub async fn confirm_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let existing = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle.confirm(&existing.status)?;

        self.patch_appointment(
            appointment_id,
            json!({
                "status": "confirmed",
                "confirmed_at": Utc::now().to_rfc3339(),
                "updated_at": Utc::now().to_rfc3339(),
            }),
            auth_token,
        )
        .await
    }

    pub async fn start_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let existing = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle.start(&existing.status)?;

        self.set_status(appointment_id, "in_progress", auth_token).await
    }

    pub async fn complete_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let existing = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle.complete(&existing.status)?;

        self.set_status(appointment_id, "completed", auth_token).await
    }

    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let existing = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle.cancel(&existing.status)?;

        self.set_status(appointment_id, "cancelled", auth_token).await
    }

    /// No-show is recorded by staff after the fact. It is a data-entry mark
    /// on a settled day, not a lifecycle transition, so the state machine is
    /// not consulted beyond refusing to overwrite a terminal status.
    pub async fn mark_no_show(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let existing = self.get_appointment(appointment_id, auth_token).await?;
        if existing.status.is_terminal() {
            return Err(AppointmentError::InvalidTransition(
                "Settled appointments cannot be marked as no-show".to_string(),
            ));
        }

        self.set_status(appointment_id, "no_show", auth_token).await
    }

    // ----- internals -------------------------------------------------------

    async fn acquire_with_retry(
        &self,
        veterinarian_id: Uuid,
        date: chrono::NaiveDate,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        match self.locks.acquire(veterinarian_id, date, auth_token).await {
            Ok(()) => Ok(()),
            Err(AppointmentError::SlotLocked) => {
                debug!(
                    "Scheduling lock contended for veterinarian {} on {}, retrying",
                    veterinarian_id, date
                );
                tokio::time::sleep(Duration::from_millis(LOCK_RETRY_DELAY_MS)).await;
                self.locks.acquire(veterinarian_id, date, auth_token).await
            }
            Err(e) => Err(e),
        }
    }

    async fn validate_and_insert(
        &self,
        request: &BookAppointmentRequest,
        proposal: &ProposedAppointment,
        created_by: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        self.validator.validate(proposal, auth_token).await?;

        let now = Utc::now();
        let body = json!({
            "patient_id": request.patient_id,
            "owner_id": request.owner_id,
            "veterinarian_id": request.veterinarian_id,
            "created_by": created_by,
            "appointment_date": request.appointment_date,
            "appointment_time": request.appointment_time.format("%H:%M:%S").to_string(),
            "duration_minutes": proposal.duration_minutes,
            "appointment_type": request.appointment_type.unwrap_or(crate::models::AppointmentType::Consultation),
            "status": "scheduled",
            "priority": request.priority.unwrap_or(crate::models::Priority::Normal),
            "reason": request.reason,
            "notes": request.notes,
            "contact_phone": request.contact_phone,
            "reminder_sent": false,
            "confirmation_required": true,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339(),
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(body),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let appointment: Appointment = result
            .into_iter()
            .next()
            .ok_or_else(|| {
                AppointmentError::DatabaseError("Insert returned no representation".to_string())
            })
            .and_then(|row| {
                serde_json::from_value(row).map_err(|e| {
                    AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e))
                })
            })?;

        info!(
            "Booked appointment {} for veterinarian {} on {} at {}",
            appointment.id,
            appointment.veterinarian_id,
            appointment.appointment_date,
            appointment.appointment_time
        );
        Ok(appointment)
    }

    async fn set_status(
        &self,
        appointment_id: Uuid,
        status: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        self.patch_appointment(
            appointment_id,
            json!({
                "status": status,
                "updated_at": Utc::now().to_rfc3339(),
            }),
            auth_token,
        )
        .await
    }

    async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        body: Value,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .next()
            .ok_or(AppointmentError::NotFound)
            .and_then(|row| {
                serde_json::from_value(row).map_err(|e| {
                    AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e))
                })
            })
    }
}

fn representation_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}
