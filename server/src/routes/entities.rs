//! Per-entity endpoints: in-flight changes, conflicts, history.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use changeline_engine::{ChangeRecord, Conflict, EntityKey, Indicator};
use serde::Serialize;
use serde_json::Value;

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{
    handle_clear_conflicts, handle_history, handle_resolve, handle_rollback, HistoryParams,
    ResolveRequest, ResolveResponse, RollbackRequest, RollbackResponse,
};
use crate::AppState;

/// Create entity routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/entities/{entity_type}/{entity_id}/changes", get(changes))
        .route(
            "/entities/{entity_type}/{entity_id}/conflicts",
            get(conflicts).delete(clear_conflicts),
        )
        .route(
            "/entities/{entity_type}/{entity_id}/conflicts/resolve",
            post(resolve),
        )
        .route("/entities/{entity_type}/{entity_id}/indicator", get(indicator))
        .route("/entities/{entity_type}/{entity_id}/history", get(history))
        .route(
            "/entities/{entity_type}/{entity_id}/history/{change_id}/rollback",
            post(rollback),
        )
        .route(
            "/entities/{entity_type}/{entity_id}/subscribe",
            post(subscribe).delete(unsubscribe),
        )
}

fn entity_key((entity_type, entity_id): (String, String)) -> EntityKey {
    EntityKey::new(entity_type, entity_id)
}

async fn changes(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(path): Path<(String, String)>,
) -> Json<Vec<ChangeRecord>> {
    Json(state.provider.entity_changes(&entity_key(path)))
}

async fn conflicts(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(path): Path<(String, String)>,
) -> Json<Vec<Conflict>> {
    Json(state.provider.entity_conflicts(&entity_key(path)))
}

#[derive(Serialize)]
struct Cleared {
    cleared: usize,
}

async fn clear_conflicts(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(path): Path<(String, String)>,
) -> Result<Json<Cleared>> {
    let cleared = handle_clear_conflicts(&state.provider, &entity_key(path))?;
    Ok(Json(Cleared { cleared }))
}

async fn resolve(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(path): Path<(String, String)>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>> {
    let response = handle_resolve(
        &state.provider,
        state.api.as_ref(),
        entity_key(path),
        request,
    )
    .await?;
    Ok(Json(response))
}

async fn indicator(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(path): Path<(String, String)>,
) -> Json<Indicator> {
    Json(state.provider.indicator(&entity_key(path)))
}

async fn history(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(path): Path<(String, String)>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Value>> {
    let query = params.to_query(entity_key(path), state.config.history_limit);
    let page = handle_history(
        &state.cache,
        state.api.as_ref(),
        &query,
        params.expand.as_deref(),
        state.config.rollback_enabled,
    )
    .await?;
    Ok(Json(page))
}

async fn rollback(
    _user: AuthUser,
    State(state): State<AppState>,
    Path((entity_type, entity_id, change_id)): Path<(String, String, String)>,
    Json(request): Json<RollbackRequest>,
) -> Result<(StatusCode, Json<RollbackResponse>)> {
    let query = changeline_engine::HistoryQuery::new(EntityKey::new(entity_type, entity_id))
        .with_rollbacks(true)
        .with_limit(state.config.history_limit);
    let response = handle_rollback(
        &state.cache,
        state.api.as_ref(),
        &query,
        &change_id,
        request,
        state.config.rollback_enabled,
    )
    .await?;

    let status = match response {
        RollbackResponse::ConfirmationRequired { .. } => StatusCode::OK,
        RollbackResponse::Submitted { .. } => StatusCode::ACCEPTED,
    };
    Ok((status, Json(response)))
}

#[derive(Serialize)]
struct Subscribed {
    subscribed: bool,
}

async fn subscribe(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(path): Path<(String, String)>,
) -> (StatusCode, Json<Subscribed>) {
    let status = if state.provider.hold_entity(entity_key(path)) {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (status, Json(Subscribed { subscribed: true }))
}

async fn unsubscribe(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(path): Path<(String, String)>,
) -> StatusCode {
    if state.provider.release_entity(&entity_key(path)) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
