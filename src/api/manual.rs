use super::{ApiError, ApiState};
use crate::state::{Entity, ManualAction};
use axum::{
    extract::{Path, State},
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// Body of an override request
#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    pub action: ManualAction,
}

/// Create manual override router
pub fn create_override_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/entities/:id/override", post(override_entity))
        .with_state(state)
}

/// POST /api/entities/:id/override - Operator action on one entity
///
/// Returns the updated entity. 404 when the entity is unknown, 409 when the
/// action is not applicable in the entity's current state.
async fn override_entity(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(request): Json<OverrideRequest>,
) -> Result<Json<Entity>, ApiError> {
    let entity = state
        .scheduler
        .request_override(&id, request.action)
        .await?;

    Ok(Json(entity))
}
