// Module: http
// REST endpoints and the wall WebSocket

pub mod error;
pub mod health;
pub mod info;
pub mod websocket;

use std::sync::Arc;

use axum::{routing::get, Router};
use glacier_core::bootstrap::Services;
use glacier_core::config::OperatorConfig;
use glacier_core::service::{DisconnectReconciler, SubscriptionControl, SubscriptionRegistry};
use glacier_core::Config;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::hub::ClientHub;

pub use error::{AppError, AppResult};

/// Instance facts served to the frontend
#[derive(Debug, Clone)]
pub struct InstanceInfo {
    pub handle: String,
    pub domain: String,
    pub operator: OperatorConfig,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub control: SubscriptionControl,
    pub registry: Arc<SubscriptionRegistry>,
    pub reconciler: Arc<DisconnectReconciler>,
    pub hub: ClientHub,
    pub instance: Arc<InstanceInfo>,
}

impl AppState {
    #[must_use]
    pub fn new(services: &Services, hub: ClientHub, config: &Config) -> Self {
        Self {
            control: services.control.clone(),
            registry: Arc::clone(&services.registry),
            reconciler: Arc::clone(&services.reconciler),
            hub,
            instance: Arc::new(InstanceInfo {
                handle: config.mastodon.handle.clone(),
                domain: config.glacier.domain.clone(),
                operator: config.glacier.operator.clone(),
            }),
        }
    }
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::create_health_router())
        .merge(info::create_info_router())
        .route("/ws", get(websocket::websocket_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
