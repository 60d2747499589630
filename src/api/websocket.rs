use super::ApiState;
use crate::subscription::ConnectionManager;
use axum::{
    extract::{ws::WebSocket, State, WebSocketUpgrade},
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use tracing::info;

/// GET /api/ws - WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<ApiState>>) -> Response {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Create WebSocket router
pub fn create_ws_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/ws", get(ws_handler))
        .with_state(state)
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<ApiState>) {
    // Subscribe before reading the latest snapshot so no tick is missed
    let snapshot_rx = state.scheduler.subscribe();
    let initial = state.scheduler.latest();

    ConnectionManager::new()
        .handle(
            socket,
            initial,
            snapshot_rx,
            state.scheduler.metrics_tracker().clone(),
        )
        .await;
}
