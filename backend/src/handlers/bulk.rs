//! Bulk transition HTTP handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use shared::BulkForm;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::middleware::CurrentActor;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BulkPreviewInput {
    #[validate(length(min = 1, message = "select at least one request"))]
    pub request_ids: Vec<Uuid>,
}

/// Open a bulk form over the selected requests
pub async fn preview_bulk(
    State(state): State<AppState>,
    CurrentActor(_actor): CurrentActor,
    Json(input): Json<BulkPreviewInput>,
) -> impl IntoResponse {
    if let Err(e) = input.validate() {
        return AppError::from(e).into_response();
    }

    match state.bulk().prepare(&input.request_ids).await {
        Ok(form) => (StatusCode::OK, Json(form)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Commit an edited bulk form
pub async fn commit_bulk(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(form): Json<BulkForm>,
) -> impl IntoResponse {
    match state.bulk().commit(&form, &actor).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => e.into_response(),
    }
}
