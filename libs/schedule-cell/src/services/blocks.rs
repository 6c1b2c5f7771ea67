// libs/schedule-cell/src/services/blocks.rs
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
    AppointmentBlock, BlockQuery, CreateBlockRequest, ScheduleError, UpdateBlockRequest,
};

pub struct BlockService {
    supabase: Arc<SupabaseClient>,
}

impl BlockService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    /// Record an unavailability interval for a veterinarian.
    pub async fn create_block(
        &self,
        request: CreateBlockRequest,
        created_by: Uuid,
        auth_token: &str,
    ) -> Result<AppointmentBlock, ScheduleError> {
        debug!(
            "Creating block for veterinarian {} from {} to {}",
            request.veterinarian_id, request.start_datetime, request.end_datetime
        );

        if request.start_datetime >= request.end_datetime {
            let mut errors = ValidationErrors::new();
            errors.add("end_datetime", "End of block must be after its start");
            return Err(ScheduleError::Validation(errors));
        }

        let block_data = json!({
            "veterinarian_id": request.veterinarian_id,
            "start_datetime": request.start_datetime,
            "end_datetime": request.end_datetime,
            "reason": request.reason,
            "is_active": true,
            "created_by": created_by,
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
                "/rest/v1/appointment_blocks",
                Some(auth_token),
                Some(block_data),
                Some(headers),
            )
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| ScheduleError::DatabaseError("Failed to create block".to_string()))?;

        serde_json::from_value(row).map_err(|e| ScheduleError::DatabaseError(e.to_string()))
    }

    pub async fn update_block(
        &self,
        block_id: Uuid,
        request: UpdateBlockRequest,
        auth_token: &str,
    ) -> Result<AppointmentBlock, ScheduleError> {
        debug!("Updating block {}", block_id);

        let current = self.get_block(block_id, auth_token).await?;

        let start = request.start_datetime.unwrap_or(current.start_datetime);
        let end = request.end_datetime.unwrap_or(current.end_datetime);

        if start >= end {
            let mut errors = ValidationErrors::new();
            errors.add("end_datetime", "End of block must be after its start");
            return Err(ScheduleError::Validation(errors));
        }

        let mut update_data = serde_json::Map::new();
        if let Some(start) = request.start_datetime {
            update_data.insert("start_datetime".to_string(), json!(start));
        }
        if let Some(end) = request.end_datetime {
            update_data.insert("end_datetime".to_string(), json!(end));
        }
        if let Some(reason) = request.reason {
            update_data.insert("reason".to_string(), json!(reason));
        }
        if let Some(is_active) = request.is_active {
            update_data.insert("is_active".to_string(), json!(is_active));
        }

        self.patch_block(block_id, Value::Object(update_data), auth_token)
            .await
    }

    /// Soft-disable: the block stays on record but stops occupying time.
    pub async fn deactivate_block(
        &self,
        block_id: Uuid,
        auth_token: &str,
    ) -> Result<AppointmentBlock, ScheduleError> {
        debug!("Deactivating block {}", block_id);
        self.get_block(block_id, auth_token).await?;
        self.patch_block(block_id, json!({ "is_active": false }), auth_token)
            .await
    }

    pub async fn get_block(
        &self,
        block_id: Uuid,
        auth_token: &str,
    ) -> Result<AppointmentBlock, ScheduleError> {
        let path = format!("/rest/v1/appointment_blocks?id=eq.{}", block_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(ScheduleError::NotFound)?;
        serde_json::from_value(row).map_err(|e| ScheduleError::DatabaseError(e.to_string()))
    }

    pub async fn list_blocks(
        &self,
        query: BlockQuery,
        auth_token: &str,
    ) -> Result<Vec<AppointmentBlock>, ScheduleError> {
        let mut query_parts = Vec::new();
        if let Some(vet_id) = query.veterinarian_id {
            query_parts.push(format!("veterinarian_id=eq.{}", vet_id));
        }
        if let Some(active) = query.is_active {
            query_parts.push(format!("is_active=eq.{}", active));
        }
        query_parts.push("order=start_datetime.asc".to_string());

        let path = format!("/rest/v1/appointment_blocks?{}", query_parts.join("&"));
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AppointmentBlock>, _>>()
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse blocks: {}", e)))
    }

    pub async fn delete_block(&self, block_id: Uuid, auth_token: &str) -> Result<(), ScheduleError> {
        self.get_block(block_id, auth_token).await?;

        let path = format!("/rest/v1/appointment_blocks?id=eq.{}", block_id);
        let _: Vec<Value> = self
            .supabase
            .request(Method::DELETE, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn patch_block(
        &self,
        block_id: Uuid,
        body: Value,
        auth_token: &str,
    ) -> Result<AppointmentBlock, ScheduleError> {
        let path = format!("/rest/v1/appointment_blocks?id=eq.{}", block_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, Some(auth_token), Some(body), Some(headers))
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(ScheduleError::NotFound)?;
        serde_json::from_value(row).map_err(|e| ScheduleError::DatabaseError(e.to_string()))
    }
}
