//! Health check endpoint.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

/// Health check response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub pending_changes: usize,
    pub conflicted_entities: usize,
    pub ui_clients: usize,
    pub topics: usize,
    pub held_subscriptions: usize,
    pub cached_queries: usize,
}

/// Create health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
}

/// Health check handler.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        pending_changes: state.provider.pending_count(),
        conflicted_entities: state.provider.conflicted_count(),
        ui_clients: state.hub.subscriber_count(crate::channel::UI_TOPIC),
        topics: state.hub.topic_count(),
        held_subscriptions: state.provider.held_count(),
        cached_queries: state.cache.len(),
    })
}

/// Root handler.
async fn root() -> &'static str {
    "Changeline Server"
}
