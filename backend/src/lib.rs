//! Parts fulfillment server
//!
//! Hosts the purchase-request workflow: persistence, the async services
//! around the pure state machine in `shared`, and a thin HTTP surface.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;

pub use config::Config;

use gateway::PersistenceGateway;
use services::{BulkTransitionService, Clock, IdGenerator, SetService, WorkflowService};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn PersistenceGateway>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn workflow(&self) -> WorkflowService {
        WorkflowService::new(self.gateway.clone(), self.clock.clone(), self.ids.clone())
    }

    pub fn bulk(&self) -> BulkTransitionService {
        BulkTransitionService::new(
            self.gateway.clone(),
            self.clock.clone(),
            self.config.workflow.max_bulk_size,
            self.config.workflow.atomic_batches,
        )
    }

    pub fn sets(&self) -> SetService {
        SetService::new(self.gateway.clone(), self.clock.clone(), self.ids.clone())
    }
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Parts Fulfillment API v1.0"
}
