// libs/schedule-cell/src/services/schedule.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::error::ValidationErrors;

use crate::models::{
    CreateScheduleRequest, ScheduleError, ScheduleQuery, UpdateScheduleRequest,
    VeterinarianSchedule,
};

pub struct ScheduleService {
    supabase: Arc<SupabaseClient>,
}

impl ScheduleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    /// Create a working-hours row for a veterinarian and weekday.
    pub async fn create_schedule(
        &self,
        request: CreateScheduleRequest,
        auth_token: &str,
    ) -> Result<VeterinarianSchedule, ScheduleError> {
        debug!(
            "Creating schedule for veterinarian {} on weekday {}",
            request.veterinarian_id, request.day_of_week
        );

        let mut errors = ValidationErrors::new();

        if request.start_time >= request.end_time {
            errors.add("end_time", "End time must be after start time");
        }
        if !(0..=6).contains(&request.day_of_week) {
            errors.add(
                "day_of_week",
                "Day of week must be between 0 (Sunday) and 6 (Saturday)",
            );
        }

        // One row per (veterinarian, weekday)
        if errors.is_empty() {
            let existing = self
                .find_schedules(
                    Some(request.veterinarian_id),
                    Some(request.day_of_week),
                    None,
                    auth_token,
                )
                .await?;
            if !existing.is_empty() {
                errors.add(
                    "day_of_week",
                    "A schedule already exists for this veterinarian on this day",
                );
            }
        }

        errors.into_result().map_err(ScheduleError::Validation)?;

        let schedule_data = json!({
            "veterinarian_id": request.veterinarian_id,
            "day_of_week": request.day_of_week,
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "end_time": request.end_time.format("%H:%M:%S").to_string(),
            "is_active": request.is_active.unwrap_or(true),
            "created_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/veterinarian_schedules",
                Some(auth_token),
                Some(schedule_data),
                Some(headers),
            )
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| ScheduleError::DatabaseError("Failed to create schedule".to_string()))?;

        serde_json::from_value(row).map_err(|e| ScheduleError::DatabaseError(e.to_string()))
    }

    pub async fn update_schedule(
        &self,
        schedule_id: Uuid,
        request: UpdateScheduleRequest,
        auth_token: &str,
    ) -> Result<VeterinarianSchedule, ScheduleError> {
        debug!("Updating schedule {}", schedule_id);

        let current = self.get_schedule(schedule_id, auth_token).await?;

        let start_time = request.start_time.unwrap_or(current.start_time);
        let end_time = request.end_time.unwrap_or(current.end_time);

        if start_time >= end_time {
            let mut errors = ValidationErrors::new();
            errors.add("end_time", "End time must be after start time");
            return Err(ScheduleError::Validation(errors));
        }

        let mut update_data = serde_json::Map::new();
        if let Some(start) = request.start_time {
            update_data.insert(
                "start_time".to_string(),
                json!(start.format("%H:%M:%S").to_string()),
            );
        }
        if let Some(end) = request.end_time {
            update_data.insert(
                "end_time".to_string(),
                json!(end.format("%H:%M:%S").to_string()),
            );
        }
        if let Some(is_active) = request.is_active {
            update_data.insert("is_active".to_string(), json!(is_active));
        }

        let path = format!("/rest/v1/veterinarian_schedules?id=eq.{}", schedule_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(Value::Object(update_data)),
                Some(headers),
            )
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(ScheduleError::NotFound)?;
        serde_json::from_value(row).map_err(|e| ScheduleError::DatabaseError(e.to_string()))
    }

    pub async fn get_schedule(
        &self,
        schedule_id: Uuid,
        auth_token: &str,
    ) -> Result<VeterinarianSchedule, ScheduleError> {
        let path = format!("/rest/v1/veterinarian_schedules?id=eq.{}", schedule_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(ScheduleError::NotFound)?;
        serde_json::from_value(row).map_err(|e| ScheduleError::DatabaseError(e.to_string()))
    }

    pub async fn list_schedules(
        &self,
        query: ScheduleQuery,
        auth_token: &str,
    ) -> Result<Vec<VeterinarianSchedule>, ScheduleError> {
        self.find_schedules(
            query.veterinarian_id,
            query.day_of_week,
            query.is_active,
            auth_token,
        )
        .await
    }

    pub async fn delete_schedule(
        &self,
        schedule_id: Uuid,
        auth_token: &str,
    ) -> Result<(), ScheduleError> {
        // Surface 404 before deleting so callers can tell the difference
        self.get_schedule(schedule_id, auth_token).await?;

        let path = format!("/rest/v1/veterinarian_schedules?id=eq.{}", schedule_id);
        let _: Vec<Value> = self
            .supabase
            .request(Method::DELETE, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn find_schedules(
        &self,
        veterinarian_id: Option<Uuid>,
        day_of_week: Option<i32>,
        is_active: Option<bool>,
        auth_token: &str,
    ) -> Result<Vec<VeterinarianSchedule>, ScheduleError> {
        let mut query_parts = Vec::new();
        if let Some(vet_id) = veterinarian_id {
            query_parts.push(format!("veterinarian_id=eq.{}", vet_id));
        }
        if let Some(day) = day_of_week {
            query_parts.push(format!("day_of_week=eq.{}", day));
        }
        if let Some(active) = is_active {
            query_parts.push(format!("is_active=eq.{}", active));
        }
        query_parts.push("order=day_of_week.asc,start_time.asc".to_string());

        let path = format!("/rest/v1/veterinarian_schedules?{}", query_parts.join("&"));
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<VeterinarianSchedule>, _>>()
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse schedules: {}", e)))
    }
}
