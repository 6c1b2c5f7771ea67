// libs/schedule-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    BlockQuery, CreateBlockRequest, CreateScheduleRequest, ScheduleError, ScheduleQuery,
    UpdateBlockRequest, UpdateScheduleRequest,
};
use crate::services::blocks::BlockService;
use crate::services::schedule::ScheduleService;

fn map_schedule_error(e: ScheduleError) -> AppError {
    match e {
        ScheduleError::NotFound => AppError::NotFound("Schedule or block not found".to_string()),
        ScheduleError::Validation(errors) => AppError::Validation(errors),
        ScheduleError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn require_schedule_manager(user: &User) -> Result<(), AppError> {
    let role = user.require_role()?;
    if !role.can_manage_schedules() {
        return Err(AppError::Auth(
            "Only admins and veterinarians can manage schedules and blocks".to_string(),
        ));
    }
    Ok(())
}

// ==============================================================================
// WORKING-HOURS HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_schedule(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateScheduleRequest>,
) -> Result<(axum::http::StatusCode, Json<Value>), AppError> {
    require_schedule_manager(&user)?;

    let service = ScheduleService::new(&state);
    let schedule = service
        .create_schedule(request, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok((axum::http::StatusCode::CREATED, Json(json!(schedule))))
}

#[axum::debug_handler]
pub async fn list_schedules(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<Value>, AppError> {
    let service = ScheduleService::new(&state);
    let schedules = service
        .list_schedules(query, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!(schedules)))
}

#[axum::debug_handler]
pub async fn get_schedule(
    State(state): State<Arc<AppConfig>>,
    Path(schedule_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = ScheduleService::new(&state);
    let schedule = service
        .get_schedule(schedule_id, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!(schedule)))
}

#[axum::debug_handler]
pub async fn update_schedule(
    State(state): State<Arc<AppConfig>>,
    Path(schedule_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    require_schedule_manager(&user)?;

    let service = ScheduleService::new(&state);
    let schedule = service
        .update_schedule(schedule_id, request, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!(schedule)))
}

#[axum::debug_handler]
pub async fn delete_schedule(
    State(state): State<Arc<AppConfig>>,
    Path(schedule_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_schedule_manager(&user)?;

    let service = ScheduleService::new(&state);
    service
        .delete_schedule(schedule_id, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({ "success": true })))
}

// ==============================================================================
// BLOCK HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_block(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateBlockRequest>,
) -> Result<(axum::http::StatusCode, Json<Value>), AppError> {
    require_schedule_manager(&user)?;

    let created_by = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Invalid user id in token".to_string()))?;

    let service = BlockService::new(&state);
    let block = service
        .create_block(request, created_by, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok((axum::http::StatusCode::CREATED, Json(json!(block))))
}

#[axum::debug_handler]
pub async fn list_blocks(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Query(query): Query<BlockQuery>,
) -> Result<Json<Value>, AppError> {
    let service = BlockService::new(&state);
    let blocks = service
        .list_blocks(query, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!(blocks)))
}

#[axum::debug_handler]
pub async fn get_block(
    State(state): State<Arc<AppConfig>>,
    Path(block_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = BlockService::new(&state);
    let block = service
        .get_block(block_id, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!(block)))
}

#[axum::debug_handler]
pub async fn update_block(
    State(state): State<Arc<AppConfig>>,
    Path(block_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateBlockRequest>,
) -> Result<Json<Value>, AppError> {
    require_schedule_manager(&user)?;

    let service = BlockService::new(&state);
    let block = service
        .update_block(block_id, request, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!(block)))
}

#[axum::debug_handler]
pub async fn deactivate_block(
    State(state): State<Arc<AppConfig>>,
    Path(block_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_schedule_manager(&user)?;

    let service = BlockService::new(&state);
    let block = service
        .deactivate_block(block_id, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!(block)))
}

#[axum::debug_handler]
pub async fn delete_block(
    State(state): State<Arc<AppConfig>>,
    Path(block_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_schedule_manager(&user)?;

    let service = BlockService::new(&state);
    service
        .delete_block(block_id, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({ "success": true })))
}
