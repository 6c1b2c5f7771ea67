// libs/schedule-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn schedule_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::create_schedule))
        .route("/", get(handlers::list_schedules))
        .route("/{schedule_id}", get(handlers::get_schedule))
        .route("/{schedule_id}", put(handlers::update_schedule))
        .route("/{schedule_id}", axum::routing::delete(handlers::delete_schedule))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}

pub fn block_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::create_block))
        .route("/", get(handlers::list_blocks))
        .route("/{block_id}", get(handlers::get_block))
        .route("/{block_id}", put(handlers::update_block))
        .route("/{block_id}", axum::routing::delete(handlers::delete_block))
        .route("/{block_id}/deactivate", post(handlers::deactivate_block))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
