//! Purchase request HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use shared::{CreateRequestInput, RequestStatus, Transition};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentActor;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListRequestsQuery {
    pub status: String,
}

/// Submit a new purchase request
pub async fn create_request(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(input): Json<CreateRequestInput>,
) -> impl IntoResponse {
    match state.workflow().create_request(input, &actor).await {
        Ok(request) => (StatusCode::CREATED, Json(request)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// List requests in one status
pub async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<ListRequestsQuery>,
) -> impl IntoResponse {
    let status = match query.status.parse::<RequestStatus>() {
        Ok(status) => status,
        Err(e) => return AppError::from(e).into_response(),
    };

    match state.workflow().list_by_status(status).await {
        Ok(requests) => {
            (StatusCode::OK, Json(serde_json::json!({ "requests": requests }))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Get a request
pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.workflow().get(id).await {
        Ok(request) => (StatusCode::OK, Json(request)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Status history in time order
pub async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.workflow().history(id).await {
        Ok(history) => {
            (StatusCode::OK, Json(serde_json::json!({ "history": history }))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Apply one transition
pub async fn transition_request(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    Json(transition): Json<Transition>,
) -> impl IntoResponse {
    match state.workflow().transition(id, &transition, &actor).await {
        Ok(request) => (StatusCode::OK, Json(request)).into_response(),
        Err(e) => e.into_response(),
    }
}
