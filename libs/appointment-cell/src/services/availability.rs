// libs/appointment-cell/src/services/availability.rs
use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use schedule_cell::models::{day_of_week_index, AppointmentBlock, VeterinarianSchedule};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::interval::TimeSlot;
use crate::models::{Appointment, AppointmentError, BlockedPeriod, DayAgenda};

/// Computes daily and weekly agendas: booked appointments, free fixed-grid
/// slots, and the blocked periods clipped to each day.
pub struct AvailabilityService {
    supabase: Arc<SupabaseClient>,
    slot_duration_minutes: i64,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            slot_duration_minutes: config.slot_duration_minutes,
        }
    }

    pub async fn day_agenda(
        &self,
        veterinarian_id: uuid::Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<DayAgenda, AppointmentError> {
        debug!("Building agenda for veterinarian {} on {}", veterinarian_id, date);

        let schedule = self.fetch_schedule(veterinarian_id, date, auth_token).await?;
        let appointments = self
            .fetch_day_appointments(veterinarian_id, date, auth_token)
            .await?;
        let blocks = self.fetch_day_blocks(veterinarian_id, date, auth_token).await?;

        let available_slots = match &schedule {
            Some(schedule) => compute_free_slots(
                date,
                schedule,
                &appointments,
                &blocks,
                self.slot_duration_minutes,
            ),
            // No working hours configured for this weekday
            None => Vec::new(),
        };

        Ok(DayAgenda {
            date,
            veterinarian_id,
            appointments,
            available_slots,
            blocked_periods: blocked_periods_for_day(date, &blocks),
        })
    }

    /// Seven consecutive daily agendas starting at `week_start`, keyed by
    /// ISO date. ISO keys sort chronologically.
    pub async fn weekly_agenda(
        &self,
        veterinarian_id: uuid::Uuid,
        week_start: NaiveDate,
        auth_token: &str,
    ) -> Result<BTreeMap<String, DayAgenda>, AppointmentError> {
        let mut agendas = BTreeMap::new();
        for offset in 0..7 {
            let date = week_start + Duration::days(offset);
            let agenda = self.day_agenda(veterinarian_id, date, auth_token).await?;
            agendas.insert(date.to_string(), agenda);
        }
        Ok(agendas)
    }

    async fn fetch_schedule(
        &self,
        veterinarian_id: uuid::Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Option<VeterinarianSchedule>, AppointmentError> {
        let day = day_of_week_index(date.weekday());
        let path = format!(
            "/rest/v1/veterinarian_schedules?veterinarian_id=eq.{}&day_of_week=eq.{}&is_active=eq.true",
            veterinarian_id, day
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

    /// Every appointment of the day, settled ones included; the agenda is a
    /// record of the day, not just its open bookings. Slot math filters on
    /// occupancy separately.
    async fn fetch_day_appointments(
        &self,
        veterinarian_id: uuid::Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?veterinarian_id=eq.{}&appointment_date=eq.{}&order=appointment_time.asc",
            veterinarian_id, date
        );

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

    /// Active blocks intersecting the day `[00:00, 24:00)`.
    async fn fetch_day_blocks(
        &self,
        veterinarian_id: uuid::Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<AppointmentBlock>, AppointmentError> {
        let day_start = date.and_time(NaiveTime::MIN);
        let day_end = day_start + Duration::days(1);
        let path = format!(
            "/rest/v1/appointment_blocks?veterinarian_id=eq.{}&is_active=eq.true&start_datetime=lt.{}&end_datetime=gt.{}",
            veterinarian_id,
            day_end.format("%Y-%m-%dT%H:%M:%S"),
            day_start.format("%Y-%m-%dT%H:%M:%S")
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
}

/// Walk the working hours on a fixed grid and keep every slot that fits
/// before closing and touches neither an occupying appointment nor an active
/// block. `08:00-12:00` with 30-minute slots yields eight candidates.
pub fn compute_free_slots(
    date: NaiveDate,
    schedule: &VeterinarianSchedule,
    appointments: &[Appointment],
    blocks: &[AppointmentBlock],
    slot_duration_minutes: i64,
) -> Vec<String> {
    let step = Duration::minutes(slot_duration_minutes);
    let mut slots = Vec::new();
    let mut current = date.and_time(schedule.start_time);
    let end = date.and_time(schedule.end_time);

    while current + step <= end {
        let candidate = TimeSlot::new(current, current + step);

        let taken = appointments
            .iter()
            .any(|apt| apt.is_occupying() && apt.slot().overlaps(&candidate));
        let blocked = blocks.iter().any(|block| {
            block.is_active
                && TimeSlot::new(block.start_datetime, block.end_datetime).overlaps(&candidate)
        });

        if !taken && !blocked {
            slots.push(current.format("%H:%M").to_string());
        }
        current += step;
    }

    slots
}

/// Block intervals clipped to the day, rendered as HH:MM. A block running to
/// the following midnight renders its end as "24:00" rather than "00:00".
pub fn blocked_periods_for_day(date: NaiveDate, blocks: &[AppointmentBlock]) -> Vec<BlockedPeriod> {
    let day_end = date.and_time(NaiveTime::MIN) + Duration::days(1);

    blocks
        .iter()
        .filter(|block| block.is_active)
        .filter_map(|block| {
            let clipped =
                TimeSlot::new(block.start_datetime, block.end_datetime).clip_to_day(date)?;
            let end = if clipped.end == day_end {
                "24:00".to_string()
            } else {
                clipped.end.format("%H:%M").to_string()
            };
            Some(BlockedPeriod {
                start: clipped.start.format("%H:%M").to_string(),
                end,
                reason: block.reason.clone(),
            })
        })
        .collect()
}
