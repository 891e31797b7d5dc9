//! Route definitions for the parts fulfillment server

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .nest("/requests", request_routes())
        .nest("/bulk", bulk_routes())
        .route("/batches", post(handlers::create_batch))
        .nest("/sets", set_routes())
}

/// Purchase request routes
fn request_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_requests).post(handlers::create_request))
        .route("/:id", get(handlers::get_request))
        .route("/:id/history", get(handlers::get_history))
        .route("/:id/transitions", post(handlers::transition_request))
}

/// Bulk transition routes
fn bulk_routes() -> Router<AppState> {
    Router::new()
        .route("/preview", post(handlers::preview_bulk))
        .route("/commit", post(handlers::commit_bulk))
}

/// Multi-part set routes
fn set_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_set))
        .route("/:set_id/progress", get(handlers::get_set_progress))
}
