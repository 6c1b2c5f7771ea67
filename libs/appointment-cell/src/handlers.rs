// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentError, AppointmentQueryParams, BookAppointmentRequest, UpdateAppointmentRequest,
};
use crate::services::availability::AvailabilityService;
use crate::services::booking::AppointmentBookingService;

fn map_appointment_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::Validation(errors) => AppError::Validation(errors),
        AppointmentError::InvalidTransition(msg) => AppError::InvalidTransition(msg),
        AppointmentError::SlotLocked => AppError::Conflict(
            "The slot is being booked by another request. Please retry.".to_string(),
        ),
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

// ==============================================================================
// BOOKING AND CRUD HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(axum::http::StatusCode, Json<Value>), AppError> {
    let created_by = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Invalid user id in token".to_string()))?;

    let service = AppointmentBookingService::new(&state);
    let appointment = service
        .book_appointment(request, created_by, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok((axum::http::StatusCode::CREATED, Json(json!(appointment))))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Query(params): Query<AppointmentQueryParams>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);
    let appointments = service
        .search_appointments(&params, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointments)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);
    let appointment = service
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);
    let appointment = service
        .update_appointment(appointment_id, request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);
    service
        .delete_appointment(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "success": true })))
}

// ==============================================================================
// LIFECYCLE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);
    let appointment = service
        .confirm_appointment(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn start_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);
    let appointment = service
        .start_appointment(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);
    let appointment = service
        .complete_appointment(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);
    let appointment = service
        .cancel_appointment(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn mark_no_show(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);
    let appointment = service
        .mark_no_show(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

// ==============================================================================
// AGENDA HANDLERS
// ==============================================================================

/// Raw agenda parameters. Both are parsed by hand so a missing or malformed
/// value maps to a 400 instead of axum's generic rejection.
#[derive(Debug, Deserialize)]
pub struct AgendaParams {
    pub veterinarian_id: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WeeklyAgendaParams {
    pub veterinarian_id: Option<String>,
    pub week_start: Option<String>,
}

fn parse_vet_id(raw: Option<&str>) -> Result<Uuid, AppError> {
    let raw = raw.ok_or_else(|| {
        AppError::BadRequest("The veterinarian_id parameter is required".to_string())
    })?;
    Uuid::parse_str(raw)
        .map_err(|_| AppError::BadRequest("Invalid veterinarian_id. Expected a UUID".to_string()))
}

fn parse_date(raw: Option<&str>, param: &str) -> Result<NaiveDate, AppError> {
    let raw = raw
        .ok_or_else(|| AppError::BadRequest(format!("The {} parameter is required", param)))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest("Invalid date format. Use YYYY-MM-DD".to_string()))
}

#[axum::debug_handler]
pub async fn day_agenda(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Query(params): Query<AgendaParams>,
) -> Result<Json<Value>, AppError> {
    let veterinarian_id = parse_vet_id(params.veterinarian_id.as_deref())?;
    let date = parse_date(params.date.as_deref(), "date")?;

    let service = AvailabilityService::new(&state);
    let agenda = service
        .day_agenda(veterinarian_id, date, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(agenda)))
}

#[axum::debug_handler]
pub async fn weekly_agenda(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Query(params): Query<WeeklyAgendaParams>,
) -> Result<Json<Value>, AppError> {
    let veterinarian_id = parse_vet_id(params.veterinarian_id.as_deref())?;
    let week_start = parse_date(params.week_start.as_deref(), "week_start")?;

    let service = AvailabilityService::new(&state);
    let agendas = service
        .weekly_agenda(veterinarian_id, week_start, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(agendas)))
}
