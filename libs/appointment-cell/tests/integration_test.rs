use std::sync::Arc;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt;
use serde_json::{json, Value};
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{method, path, query_param};
use chrono::{Datelike, Duration, Utc};
use uuid::Uuid;

use appointment_cell::router::appointment_routes;
use schedule_cell::models::day_of_week_index;
use shared_config::AppConfig;
use shared_utils::test_utils::{TestConfig, TestUser, JwtTestUtils, MockClinicRows};

async fn create_test_app(config: AppConfig) -> Router {
    appointment_routes(Arc::new(config))
}

fn test_config(mock_server: &MockServer) -> AppConfig {
    let mut config = TestConfig::default().to_app_config();
    config.supabase_url = mock_server.uri();
    config
}

/// A date safely in the future so the past-date rule never interferes.
fn future_date() -> chrono::NaiveDate {
    (Utc::now() + Duration::days(30)).date_naive()
}

async fn read_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Mocks for the happy booking path: an open schedule, no blocks, no
/// existing appointments, and a free scheduling lock.
async fn setup_booking_mocks(mock_server: &MockServer, veterinarian_id: &str) {
    let date = future_date();

    Mock::given(method("GET"))
        .and(path("/rest/v1/veterinarian_schedules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicRows::schedule_row(
                veterinarian_id,
                day_of_week_index(date.weekday()),
                "08:00:00",
                "18:00:00",
            )
        ])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_blocks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/scheduling_locks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockClinicRows::lock_row(
                &format!("sched:{}:{}", veterinarian_id, date),
                veterinarian_id,
            )
        ])))
        .mount(mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/scheduling_locks"))
        .respond_with(ResponseTemplate::new(204))
        .mount(mock_server)
        .await;
}

fn booking_request_body(veterinarian_id: Uuid, patient_id: Uuid, time: &str) -> Value {
    json!({
        "patient_id": patient_id,
        "owner_id": Uuid::new_v4(),
        "veterinarian_id": veterinarian_id,
        "appointment_date": future_date().to_string(),
        "appointment_time": time,
        "duration_minutes": 30,
        "appointment_type": "consultation",
        "reason": "Annual vaccination",
        "contact_phone": "555-0100"
    })
}

fn post_json(uri: &str, token: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_book_appointment_success() {
    let mock_server = MockServer::start().await;
    let user = TestUser::receptionist("desk@clinic.example");
    let config = test_config(&mock_server);
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let veterinarian_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    setup_booking_mocks(&mock_server, &veterinarian_id.to_string()).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockClinicRows::appointment_row(
                &veterinarian_id.to_string(),
                &patient_id.to_string(),
                &future_date().to_string(),
                "10:00:00",
                30,
                "scheduled",
            )
        ])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(config).await;
    let body = booking_request_body(veterinarian_id, patient_id, "10:00:00");
    let response = app.oneshot(post_json("/", &token, &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let appointment = read_body(response).await;
    assert_eq!(appointment["status"], "scheduled");
}

#[tokio::test]
async fn test_booking_rejected_when_block_overlaps() {
    let mock_server = MockServer::start().await;
    let user = TestUser::receptionist("desk@clinic.example");
    let config = test_config(&mock_server);
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let veterinarian_id = Uuid::new_v4();
    let date = future_date();

    // Block 10:00-11:00; the 10:15 request lands inside it
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_blocks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicRows::block_row(
                &veterinarian_id.to_string(),
                &format!("{}T10:00:00", date),
                &format!("{}T11:00:00", date),
                "Staff meeting",
            )
        ])))
        .mount(&mock_server)
        .await;
    setup_booking_mocks(&mock_server, &veterinarian_id.to_string()).await;

    let app = create_test_app(config).await;
    let body = booking_request_body(veterinarian_id, Uuid::new_v4(), "10:15:00");
    let response = app.oneshot(post_json("/", &token, &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let errors = read_body(response).await;
    assert!(errors["errors"]["appointment_time"].is_array());
}

#[tokio::test]
async fn test_back_to_back_appointments_are_allowed() {
    let mock_server = MockServer::start().await;
    let user = TestUser::receptionist("desk@clinic.example");
    let config = test_config(&mock_server);
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let veterinarian_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let date = future_date();

    // Existing 09:00-09:30; the new booking starts exactly at 09:30
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("veterinarian_id", format!("eq.{}", veterinarian_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicRows::appointment_row(
                &veterinarian_id.to_string(),
                &Uuid::new_v4().to_string(),
                &date.to_string(),
                "09:00:00",
                30,
                "confirmed",
            )
        ])))
        .mount(&mock_server)
        .await;
    setup_booking_mocks(&mock_server, &veterinarian_id.to_string()).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockClinicRows::appointment_row(
                &veterinarian_id.to_string(),
                &patient_id.to_string(),
                &date.to_string(),
                "09:30:00",
                30,
                "scheduled",
            )
        ])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(config).await;
    let body = booking_request_body(veterinarian_id, patient_id, "09:30:00");
    let response = app.oneshot(post_json("/", &token, &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_patient_double_booking_rejected() {
    let mock_server = MockServer::start().await;
    let user = TestUser::receptionist("desk@clinic.example");
    let config = test_config(&mock_server);
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let veterinarian_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let date = future_date();

    // The patient already has a 10:00 appointment with a different vet
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("patient_id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicRows::appointment_row(
                &Uuid::new_v4().to_string(),
                &patient_id.to_string(),
                &date.to_string(),
                "10:00:00",
                30,
                "scheduled",
            )
        ])))
        .mount(&mock_server)
        .await;
    setup_booking_mocks(&mock_server, &veterinarian_id.to_string()).await;

    let app = create_test_app(config).await;
    let body = booking_request_body(veterinarian_id, patient_id, "10:00:00");
    let response = app.oneshot(post_json("/", &token, &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let errors = read_body(response).await;
    assert!(errors["errors"]["appointment_time"].is_array());
}

#[tokio::test]
async fn test_booking_without_schedule_rejected() {
    let mock_server = MockServer::start().await;
    let user = TestUser::receptionist("desk@clinic.example");
    let config = test_config(&mock_server);
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let veterinarian_id = Uuid::new_v4();

    // No working hours for the weekday
    Mock::given(method("GET"))
        .and(path("/rest/v1/veterinarian_schedules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    setup_booking_mocks(&mock_server, &veterinarian_id.to_string()).await;

    let app = create_test_app(config).await;
    let body = booking_request_body(veterinarian_id, Uuid::new_v4(), "10:00:00");
    let response = app.oneshot(post_json("/", &token, &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let errors = read_body(response).await;
    assert!(errors["errors"]["veterinarian_id"].is_array());
}

#[tokio::test]
async fn test_confirm_scheduled_appointment() {
    let mock_server = MockServer::start().await;
    let user = TestUser::veterinarian("vet@clinic.example");
    let config = test_config(&mock_server);
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let appointment_id = Uuid::new_v4();
    let veterinarian_id = Uuid::new_v4().to_string();
    let patient_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicRows::appointment_row(
                &veterinarian_id,
                &patient_id,
                "2024-07-01",
                "10:00:00",
                30,
                "scheduled",
            )
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicRows::appointment_row(
                &veterinarian_id,
                &patient_id,
                "2024-07-01",
                "10:00:00",
                30,
                "confirmed",
            )
        ])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(config).await;
    let request = Request::builder()
        .method("POST")
        .uri(format!("/{}/confirm", appointment_id))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let appointment = read_body(response).await;
    assert_eq!(appointment["status"], "confirmed");
}

#[tokio::test]
async fn test_cancel_completed_appointment_rejected() {
    let mock_server = MockServer::start().await;
    let user = TestUser::receptionist("desk@clinic.example");
    let config = test_config(&mock_server);
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicRows::appointment_row(
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                "2024-07-01",
                "10:00:00",
                30,
                "completed",
            )
        ])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(config).await;
    let request = Request::builder()
        .method("POST")
        .uri(format!("/{}/cancel", appointment_id))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_missing_appointment_returns_404() {
    let mock_server = MockServer::start().await;
    let user = TestUser::receptionist("desk@clinic.example");
    let config = test_config(&mock_server);
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(config).await;
    let request = Request::builder()
        .method("GET")
        .uri(format!("/{}", Uuid::new_v4()))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_day_agenda_lists_free_slots() {
    let mock_server = MockServer::start().await;
    let user = TestUser::veterinarian("vet@clinic.example");
    let config = test_config(&mock_server);
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let veterinarian_id = Uuid::new_v4();
    let date = future_date();

    Mock::given(method("GET"))
        .and(path("/rest/v1/veterinarian_schedules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicRows::schedule_row(
                &veterinarian_id.to_string(),
                day_of_week_index(date.weekday()),
                "08:00:00",
                "12:00:00",
            )
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_blocks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(config).await;
    let request = Request::builder()
        .method("GET")
        .uri(format!("/agenda?veterinarian_id={}&date={}", veterinarian_id, date))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let agenda = read_body(response).await;
    let slots = agenda["available_slots"].as_array().unwrap();
    assert_eq!(slots.len(), 8);
    assert_eq!(slots[0], "08:00");
    assert_eq!(slots[7], "11:30");
}

#[tokio::test]
async fn test_reschedule_writes_before_releasing_lock() {
    let mock_server = MockServer::start().await;
    let user = TestUser::receptionist("desk@clinic.example");
    let config = test_config(&mock_server);
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let appointment_id = Uuid::new_v4();
    let veterinarian_id = Uuid::new_v4();
    let date = future_date();
    let row = MockClinicRows::appointment_row(
        &veterinarian_id.to_string(),
        &Uuid::new_v4().to_string(),
        &date.to_string(),
        "09:00:00",
        30,
        "scheduled",
    );

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row.clone()])))
        .mount(&mock_server)
        .await;
    setup_booking_mocks(&mock_server, &veterinarian_id.to_string()).await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(config).await;
    let request = Request::builder()
        .method("PUT")
        .uri(format!("/{}", appointment_id))
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "appointment_time": "11:00:00" }).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The rescheduling write must land while the per-day lock is still
    // held; releasing first would let a concurrent booking validate against
    // the stale slot.
    let requests = mock_server.received_requests().await.unwrap();
    let patch_pos = requests
        .iter()
        .position(|r| r.method.as_str() == "PATCH" && r.url.path() == "/rest/v1/appointments")
        .expect("reschedule never patched the appointment");
    let release_pos = requests
        .iter()
        .position(|r| r.method.as_str() == "DELETE" && r.url.path() == "/rest/v1/scheduling_locks")
        .expect("reschedule never released the lock");
    assert!(patch_pos < release_pos);
}

#[tokio::test]
async fn test_day_agenda_lists_settled_appointments() {
    let mock_server = MockServer::start().await;
    let user = TestUser::veterinarian("vet@clinic.example");
    let config = test_config(&mock_server);
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let veterinarian_id = Uuid::new_v4();
    let date = future_date();

    Mock::given(method("GET"))
        .and(path("/rest/v1/veterinarian_schedules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicRows::schedule_row(
                &veterinarian_id.to_string(),
                day_of_week_index(date.weekday()),
                "08:00:00",
                "10:00:00",
            )
        ])))
        .mount(&mock_server)
        .await;
    // A cancelled appointment stays on the day's record
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicRows::appointment_row(
                &veterinarian_id.to_string(),
                &Uuid::new_v4().to_string(),
                &date.to_string(),
                "08:00:00",
                30,
                "cancelled",
            )
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_blocks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(config).await;
    let request = Request::builder()
        .method("GET")
        .uri(format!("/agenda?veterinarian_id={}&date={}", veterinarian_id, date))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let agenda = read_body(response).await;
    // Listed in the agenda, but its slot is free again
    assert_eq!(agenda["appointments"].as_array().unwrap().len(), 1);
    let slots = agenda["available_slots"].as_array().unwrap();
    assert_eq!(slots.len(), 4);
    assert_eq!(slots[0], "08:00");
}

#[tokio::test]
async fn test_weekly_agenda_is_keyed_by_date() {
    let mock_server = MockServer::start().await;
    let user = TestUser::veterinarian("vet@clinic.example");
    let config = test_config(&mock_server);
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let veterinarian_id = Uuid::new_v4();
    let week_start = future_date();

    Mock::given(method("GET"))
        .and(path("/rest/v1/veterinarian_schedules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_blocks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(config).await;
    let request = Request::builder()
        .method("GET")
        .uri(format!(
            "/weekly-agenda?veterinarian_id={}&week_start={}",
            veterinarian_id, week_start
        ))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let agendas = read_body(response).await;
    let days = agendas.as_object().unwrap();
    assert_eq!(days.len(), 7);
    for offset in 0..7 {
        let key = (week_start + Duration::days(offset)).to_string();
        assert_eq!(days[&key]["date"], key);
    }
}

#[tokio::test]
async fn test_day_agenda_rejects_malformed_date() {
    let mock_server = MockServer::start().await;
    let user = TestUser::veterinarian("vet@clinic.example");
    let config = test_config(&mock_server);
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let app = create_test_app(config).await;
    let request = Request::builder()
        .method("GET")
        .uri(format!("/agenda?veterinarian_id={}&date=01-07-2024", Uuid::new_v4()))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_request_without_token_is_unauthorized() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server);

    let app = create_test_app(config).await;
    let request = Request::builder()
        .method("GET")
        .uri(format!("/{}", Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
