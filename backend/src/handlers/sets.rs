//! Multi-part set and batch HTTP handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use shared::{CreateRequestInput, CreateSetInput};
use validator::Validate;

use crate::error::AppError;
use crate::middleware::CurrentActor;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBatchInput {
    #[validate(length(min = 1, message = "at least one part is required"))]
    pub parts: Vec<CreateRequestInput>,
}

/// Create a set of parts requested together
pub async fn create_set(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(input): Json<CreateSetInput>,
) -> impl IntoResponse {
    match state.sets().create_set(input, &actor).await {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Create independent parts in one go
pub async fn create_batch(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(input): Json<CreateBatchInput>,
) -> impl IntoResponse {
    if let Err(e) = input.validate() {
        return AppError::from(e).into_response();
    }

    match state.sets().create_batch(input.parts, &actor).await {
        Ok(requests) => {
            (StatusCode::CREATED, Json(serde_json::json!({ "requests": requests }))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Current progress of a set
pub async fn get_set_progress(
    State(state): State<AppState>,
    Path(set_id): Path<String>,
) -> impl IntoResponse {
    match state.sets().progress(&set_id).await {
        Ok(progress) => (StatusCode::OK, Json(progress)).into_response(),
        Err(e) => e.into_response(),
    }
}
