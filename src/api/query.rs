use super::{ApiError, ApiState};
use crate::alert::Alert;
use crate::scheduler::MetricsSnapshot;
use crate::snapshot::{Snapshot, StationStatus};
use crate::state::{Entity, Phase};
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Query parameters for entity listing
#[derive(Debug, Default, Deserialize)]
pub struct EntityQueryParams {
    /// Filter by entity kind (e.g., ?kind=stall)
    pub kind: Option<String>,
    /// Filter by kind-specific state label (e.g., ?state=needs_cleaning)
    pub state: Option<String>,
    /// Filter by shared phase (e.g., ?phase=maintenance_needed)
    pub phase: Option<Phase>,
}

/// Alerts currently shown, headline first
#[derive(Debug, Serialize)]
pub struct AlertsResponse {
    pub tick: u64,
    pub headline: Option<Alert>,
    pub standing: Option<Alert>,
    pub transient: Option<Alert>,
    /// Per-entity alerts (e.g., "stall-03: needs cleaning")
    pub entities: Vec<Alert>,
}

/// Create query API router
pub fn create_query_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/snapshot", get(get_snapshot))
        .route("/api/entities", get(list_entities))
        .route("/api/entities/:id", get(get_entity))
        .route("/api/stations", get(list_stations))
        .route("/api/alerts", get(get_alerts))
        .route("/api/metrics", get(get_metrics))
        .with_state(state)
}

/// GET /api/snapshot - Latest snapshot
async fn get_snapshot(State(state): State<Arc<ApiState>>) -> Json<Snapshot> {
    Json(Snapshot::clone(&state.scheduler.latest()))
}

/// GET /api/entities - List entities
///
/// Filters combine with AND logic:
/// - ?kind=stall&state=needs_cleaning
async fn list_entities(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<EntityQueryParams>,
) -> Json<Vec<Entity>> {
    let snapshot = state.scheduler.latest();

    let entities = snapshot
        .entities
        .iter()
        .filter(|e| params.kind.as_ref().map_or(true, |kind| &e.kind == kind))
        .filter(|e| params.state.as_ref().map_or(true, |label| &e.state == label))
        .filter(|e| params.phase.map_or(true, |phase| e.phase == phase))
        .cloned()
        .collect();

    Json(entities)
}

/// GET /api/entities/:id - Get specific entity
async fn get_entity(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<Entity>, ApiError> {
    let snapshot = state.scheduler.latest();
    let entity = snapshot
        .entity(&id)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("entity '{}' not found", id)))?;

    Ok(Json(entity))
}

/// GET /api/stations - Classified station statuses
async fn list_stations(State(state): State<Arc<ApiState>>) -> Json<Vec<StationStatus>> {
    Json(state.scheduler.latest().stations.clone())
}

/// GET /api/alerts - Headline, standing, transient and per-entity alerts
async fn get_alerts(State(state): State<Arc<ApiState>>) -> Json<AlertsResponse> {
    let snapshot = state.scheduler.latest();

    Json(AlertsResponse {
        tick: snapshot.tick,
        headline: snapshot.headline().cloned(),
        standing: snapshot.standing_alert.clone(),
        transient: snapshot.transient_alert.clone(),
        entities: snapshot
            .entities
            .iter()
            .filter_map(|e| e.alert.clone())
            .collect(),
    })
}

/// GET /api/metrics - Scheduler counters
async fn get_metrics(State(state): State<Arc<ApiState>>) -> Json<MetricsSnapshot> {
    Json(state.scheduler.metrics())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{build_model, FleetConfig};
    use crate::scheduler::{SchedulerHandle, TickScheduler};
    use tokio::task::JoinHandle;

    fn start(preset: &str) -> (Arc<ApiState>, SchedulerHandle, JoinHandle<()>) {
        let mut config = FleetConfig::from_preset(preset).unwrap();
        config.simulation.tick_period_ms = 3_600_000;
        config.simulation.seed = Some(5);
        let model = Arc::new(build_model(&config).unwrap());
        let (handle, task) =
            TickScheduler::new(model, Arc::new(ManualClock::at_epoch())).start();
        let state = Arc::new(ApiState {
            scheduler: handle.clone(),
        });
        (state, handle, task)
    }

    #[tokio::test]
    async fn test_list_entities_no_filters() {
        let (state, handle, task) = start("restroom");

        let result = list_entities(State(state), Query(EntityQueryParams::default())).await;
        assert_eq!(result.0.len(), 10);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_list_entities_state_filter() {
        let (state, handle, task) = start("restroom");
        handle
            .request_override("stall-02", crate::state::ManualAction::FlagMaintenance)
            .await
            .unwrap();

        let params = EntityQueryParams {
            kind: Some("stall".to_string()),
            state: Some("needs_cleaning".to_string()),
            phase: None,
        };
        let result = list_entities(State(state), Query(params)).await;

        assert_eq!(result.0.len(), 1);
        assert_eq!(result.0[0].id, "stall-02");

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_list_entities_phase_filter() {
        let (state, handle, task) = start("restroom");

        let params = EntityQueryParams {
            phase: Some(Phase::Idle),
            ..Default::default()
        };
        let result = list_entities(State(state), Query(params)).await;
        assert!(result.0.iter().all(|e| e.phase == Phase::Idle));

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_get_entity_not_found() {
        let (state, handle, task) = start("restroom");

        let result = get_entity(State(state), Path("stall-42".to_string())).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_alerts_include_entity_alerts() {
        let (state, handle, task) = start("restroom");
        handle
            .request_override("stall-07", crate::state::ManualAction::FlagMaintenance)
            .await
            .unwrap();

        let result = get_alerts(State(state)).await;
        assert_eq!(result.0.entities.len(), 1);
        assert_eq!(result.0.entities[0].source, "stall-07");
        assert!(result.0.headline.is_some());

        handle.shutdown();
        task.await.unwrap();
    }
}
