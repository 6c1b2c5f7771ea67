use std::sync::Arc;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt;
use serde_json::{json, Value};
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{method, path};
use uuid::Uuid;

use schedule_cell::router::{block_routes, schedule_routes};
use shared_config::AppConfig;
use shared_utils::test_utils::{TestConfig, TestUser, JwtTestUtils, MockClinicRows};

fn test_config(mock_server: &MockServer) -> AppConfig {
    let mut config = TestConfig::default().to_app_config();
    config.supabase_url = mock_server.uri();
    config
}

fn schedule_app(config: AppConfig) -> Router {
    schedule_routes(Arc::new(config))
}

fn block_app(config: AppConfig) -> Router {
    block_routes(Arc::new(config))
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

async fn read_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_create_schedule_success() {
    let mock_server = MockServer::start().await;
    let user = TestUser::veterinarian("vet@clinic.example");
    let config = test_config(&mock_server);
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let veterinarian_id = Uuid::new_v4();

    // Uniqueness probe finds nothing for this weekday
    Mock::given(method("GET"))
        .and(path("/rest/v1/veterinarian_schedules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/veterinarian_schedules"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockClinicRows::schedule_row(&veterinarian_id.to_string(), 1, "08:00:00", "17:00:00")
        ])))
        .mount(&mock_server)
        .await;

    let body = json!({
        "veterinarian_id": veterinarian_id,
        "day_of_week": 1,
        "start_time": "08:00:00",
        "end_time": "17:00:00"
    });
    let response = schedule_app(config)
        .oneshot(post_json("/", &token, &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let schedule = read_body(response).await;
    assert_eq!(schedule["day_of_week"], 1);
}

#[tokio::test]
async fn test_create_schedule_with_inverted_times_rejected() {
    let mock_server = MockServer::start().await;
    let user = TestUser::admin("admin@clinic.example");
    let config = test_config(&mock_server);
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let body = json!({
        "veterinarian_id": Uuid::new_v4(),
        "day_of_week": 1,
        "start_time": "17:00:00",
        "end_time": "08:00:00"
    });
    let response = schedule_app(config)
        .oneshot(post_json("/", &token, &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let errors = read_body(response).await;
    assert!(errors["errors"]["end_time"].is_array());
}

#[tokio::test]
async fn test_duplicate_weekday_schedule_rejected() {
    let mock_server = MockServer::start().await;
    let user = TestUser::veterinarian("vet@clinic.example");
    let config = test_config(&mock_server);
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let veterinarian_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/veterinarian_schedules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockClinicRows::schedule_row(&veterinarian_id.to_string(), 2, "09:00:00", "13:00:00")
        ])))
        .mount(&mock_server)
        .await;

    let body = json!({
        "veterinarian_id": veterinarian_id,
        "day_of_week": 2,
        "start_time": "08:00:00",
        "end_time": "17:00:00"
    });
    let response = schedule_app(config)
        .oneshot(post_json("/", &token, &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let errors = read_body(response).await;
    assert!(errors["errors"]["day_of_week"].is_array());
}

#[tokio::test]
async fn test_receptionist_cannot_create_schedule() {
    let mock_server = MockServer::start().await;
    let user = TestUser::receptionist("desk@clinic.example");
    let config = test_config(&mock_server);
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let body = json!({
        "veterinarian_id": Uuid::new_v4(),
        "day_of_week": 1,
        "start_time": "08:00:00",
        "end_time": "17:00:00"
    });
    let response = schedule_app(config)
        .oneshot(post_json("/", &token, &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_block_success() {
    let mock_server = MockServer::start().await;
    let user = TestUser::admin("admin@clinic.example");
    let config = test_config(&mock_server);
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let veterinarian_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointment_blocks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockClinicRows::block_row(
                &veterinarian_id.to_string(),
                "2024-07-01T10:00:00",
                "2024-07-01T11:00:00",
                "Surgery",
            )
        ])))
        .mount(&mock_server)
        .await;

    let body = json!({
        "veterinarian_id": veterinarian_id,
        "start_datetime": "2024-07-01T10:00:00",
        "end_datetime": "2024-07-01T11:00:00",
        "reason": "Surgery"
    });
    let response = block_app(config)
        .oneshot(post_json("/", &token, &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let block = read_body(response).await;
    assert_eq!(block["reason"], "Surgery");
}

#[tokio::test]
async fn test_create_block_with_inverted_times_rejected() {
    let mock_server = MockServer::start().await;
    let user = TestUser::veterinarian("vet@clinic.example");
    let config = test_config(&mock_server);
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let body = json!({
        "veterinarian_id": Uuid::new_v4(),
        "start_datetime": "2024-07-01T11:00:00",
        "end_datetime": "2024-07-01T10:00:00",
        "reason": "Surgery"
    });
    let response = block_app(config)
        .oneshot(post_json("/", &token, &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let errors = read_body(response).await;
    assert!(errors["errors"]["end_datetime"].is_array());
}

#[tokio::test]
async fn test_deactivate_block() {
    let mock_server = MockServer::start().await;
    let user = TestUser::veterinarian("vet@clinic.example");
    let config = test_config(&mock_server);
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let block_id = Uuid::new_v4();
    let active_row = MockClinicRows::block_row(
        &Uuid::new_v4().to_string(),
        "2024-07-01T10:00:00",
        "2024-07-01T11:00:00",
        "Surgery",
    );
    let mut row = active_row.clone();
    row["is_active"] = json!(false);

    // Deactivation loads the block before patching it
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_blocks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([active_row])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointment_blocks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/{}/deactivate", block_id))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = block_app(config).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let block = read_body(response).await;
    assert_eq!(block["is_active"], false);
}

#[tokio::test]
async fn test_get_missing_schedule_returns_404() {
    let mock_server = MockServer::start().await;
    let user = TestUser::veterinarian("vet@clinic.example");
    let config = test_config(&mock_server);
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    Mock::given(method("GET"))
        .and(path("/rest/v1/veterinarian_schedules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("GET")
        .uri(format!("/{}", Uuid::new_v4()))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = schedule_app(config).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
