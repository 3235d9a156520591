//! Axum Router Configuration

use crate::{state::AppState, ws::ws_handler};
use axum::{Json, Router, routing::get};
use std::sync::Arc;

/// Creates the main Axum router: the liveness probe and the WebSocket
/// endpoint.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/ws", get(ws_handler))
        .with_state(app_state)
}

async fn status() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "Server is running" }))
}
