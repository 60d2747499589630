// HTTP and WebSocket surface for renderers

pub mod manual;
pub mod query;
pub mod websocket;

pub use manual::create_override_router;
pub use query::create_query_router;
pub use websocket::{create_ws_router, ws_handler};

use crate::scheduler::SchedulerHandle;
use crate::state::OverrideError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared state for every renderer-facing router
#[derive(Clone)]
pub struct ApiState {
    pub scheduler: SchedulerHandle,
}

/// Build the full API: queries, overrides and the snapshot stream
pub fn create_router(scheduler: SchedulerHandle) -> Router {
    let state = Arc::new(ApiState { scheduler });

    Router::new()
        .merge(create_query_router(Arc::clone(&state)))
        .merge(create_override_router(Arc::clone(&state)))
        .merge(create_ws_router(state))
        .layer(CorsLayer::permissive())
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Errors returned by API handlers
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Conflict(String),
    Unavailable,
}

impl From<OverrideError> for ApiError {
    fn from(err: OverrideError) -> Self {
        match err {
            OverrideError::UnknownEntity(_) => ApiError::NotFound(err.to_string()),
            OverrideError::NotApplicable { .. } => ApiError::Conflict(err.to_string()),
            OverrideError::SchedulerStopped => ApiError::Unavailable,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Simulation is not running".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}
