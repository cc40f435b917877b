//! Changeline Server - change tracking and conflict resolution service.
//!
//! This server consumes the upstream push channel, tracks in-flight changes
//! with the changeline-engine state machine, and exposes HTTP and WebSocket
//! endpoints for UI clients to follow changes, resolve conflicts and browse
//! history.

mod auth;
mod cache;
mod channel;
mod config;
mod error;
mod handlers;
mod provider;
mod routes;
#[cfg(test)]
mod testing;
mod upstream;

use crate::cache::QueryCache;
use crate::channel::Hub;
use crate::config::Config;
use crate::provider::ChangeProvider;
use crate::upstream::{ChangeApi, HttpChangeApi};
use axum::Router;
use changeline_engine::TrackerOptions;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: Arc<Hub>,
    pub cache: Arc<QueryCache>,
    pub provider: Arc<ChangeProvider>,
    pub api: Arc<dyn ChangeApi>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "changeline_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Changeline Server on {}:{}", config.host, config.port);

    let api = HttpChangeApi::new(&config.upstream_url, config.upstream_token.clone())?;
    tracing::info!(upstream = %config.upstream_url, "Using upstream change API");

    // Build application state
    let hub = Hub::new_shared();
    let cache = Arc::new(QueryCache::new());
    let provider = ChangeProvider::new_shared(
        TrackerOptions {
            saving_toast_ms: config.saving_toast_ms,
        },
        hub.clone(),
        cache.clone(),
    );
    let _consumer = provider.start();

    let state = AppState {
        config: Arc::new(config.clone()),
        hub,
        cache,
        provider,
        api: Arc::new(api),
    };

    // Build router
    let app = Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
