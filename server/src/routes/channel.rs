//! Push channel endpoints.

use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
    routing::get,
    Router,
};

use crate::auth::AuthUser;
use crate::handlers::{handle_events_connection, handle_feed_connection};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ws/feed", get(feed))
        .route("/ws/events", get(events))
}

async fn feed(_user: AuthUser, State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_feed_connection(socket, hub))
}

async fn events(_user: AuthUser, State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_events_connection(socket, hub))
}
