//! HTTP API: lifecycle webhook, browser WebSocket, recorded artifacts.

pub mod webhook;
pub mod ws;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::hub::FanoutHub;
use crate::session::SessionManager;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionManager>,
    pub hub: Arc<FanoutHub>,
}

/// Build the HTTP router with all routes
pub fn build_router(state: AppState) -> Router {
    let webhook_path = state.config.server.webhook_path.clone();
    let recordings_dir = state.config.recording.dir.clone();

    Router::new()
        .route("/health", get(health_check))
        .route(&webhook_path, post(webhook::handle_webhook))
        .route("/ws", get(ws::ws_handler))
        .nest_service("/recordings", ServeDir::new(recordings_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "rtms-relay",
        "active_sessions": state.sessions.session_count().await,
        "frontend_clients": state.hub.client_count().await,
    }))
}
