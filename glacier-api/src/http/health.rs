//! Health check endpoints
//!
//! Provides simple health check for monitoring checks.

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use crate::http::AppState;

/// Health check router
pub fn create_health_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/stats", get(stats))
}

/// Basic health check (always returns OK if server is running)
pub async fn health_check() -> impl IntoResponse {
    "OK"
}

#[derive(Debug, Serialize)]
pub struct Stats {
    pub subscriptions: usize,
    pub connections: usize,
    pub pending_disconnects: usize,
}

/// Live counters for operators
pub async fn stats(State(state): State<AppState>) -> Json<Stats> {
    Json(Stats {
        subscriptions: state.registry.total_subscriptions(),
        connections: state.hub.total_connections(),
        pending_disconnects: state.reconciler.pending_timers(),
    })
}
