//! Error handling for the parts fulfillment server
//!
//! Provides consistent error responses in English and Korean

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use shared::{RequestStatus, WorkflowError};
use thiserror::Error;

/// One write that did not land during a non-atomic batch commit
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FailedWrite {
    pub request_id: String,
    pub code: String,
    pub message: String,
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Domain rejections
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// The store applied only part of a batch
    #[error("Partial commit: {} succeeded, {} failed", succeeded.len(), failed.len())]
    PartialCommit {
        succeeded: Vec<String>,
        failed: Vec<FailedWrite>,
    },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String, message_ko: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Internal errors
    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Workflow(shared::validation::first_violation(&errors, ""))
    }
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        AppError::Unauthorized {
            message: message.into(),
            message_ko: "인증 정보가 필요합니다".to_string(),
        }
    }

    /// The domain error behind this one, if any
    pub fn workflow(&self) -> Option<&WorkflowError> {
        match self {
            AppError::Workflow(e) => Some(e),
            _ => None,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Workflow(e) => e.code(),
            AppError::PartialCommit { .. } => "PARTIAL_COMMIT",
            AppError::Unauthorized { .. } => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::StorageError(_) => "STORAGE_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Workflow(e) => workflow_status(e),
            AppError::PartialCommit { .. } => StatusCode::CONFLICT,
            AppError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::StorageError(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Configuration(_)
            | AppError::DatabaseError(_)
            | AppError::Serialization(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn workflow_status(error: &WorkflowError) -> StatusCode {
    match error {
        WorkflowError::StateMismatch { .. } => StatusCode::CONFLICT,
        WorkflowError::Validation { .. } | WorkflowError::EmptyBatch => StatusCode::BAD_REQUEST,
        WorkflowError::CapacityExceeded { .. }
        | WorkflowError::MixedState { .. }
        | WorkflowError::TerminalState { .. }
        | WorkflowError::UnsupportedBulkStatus { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::BulkItem { source, .. } => workflow_status(source),
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_ko: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Structured values behind the message (quantities, statuses, ids)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

fn statuses_ko(statuses: &[RequestStatus]) -> String {
    statuses
        .iter()
        .map(|s| s.label(shared::Language::Korean))
        .collect::<Vec<_>>()
        .join(", ")
}

fn workflow_detail(error: &WorkflowError) -> ErrorDetail {
    let (message_ko, details) = match error {
        WorkflowError::StateMismatch {
            request_id,
            expected,
            actual,
        } => (
            format!(
                "요청 {}의 상태가 변경되었습니다 (현재: {}, 필요: {}). 새로고침 후 다시 시도하세요",
                request_id,
                actual.label(shared::Language::Korean),
                statuses_ko(expected)
            ),
            Some(json!({ "requestId": request_id, "expected": expected, "actual": actual })),
        ),
        WorkflowError::Validation { field, message } => {
            (format!("입력값이 올바르지 않습니다 ({}): {}", field, message), None)
        }
        WorkflowError::CapacityExceeded {
            requested,
            available,
        } => (
            format!(
                "출고 수량 합계 {}개가 입고 수량 {}개를 초과합니다",
                requested, available
            ),
            Some(json!({ "requested": requested, "available": available })),
        ),
        WorkflowError::MixedState { statuses } => (
            format!("일괄 처리는 같은 상태의 요청만 가능합니다 ({})", statuses_ko(statuses)),
            Some(json!({ "statuses": statuses })),
        ),
        WorkflowError::TerminalState { request_id, status } => (
            format!(
                "요청 {}은(는) 이미 {} 상태이므로 변경할 수 없습니다",
                request_id,
                status.label(shared::Language::Korean)
            ),
            Some(json!({ "requestId": request_id, "status": status })),
        ),
        WorkflowError::BulkItem { request_id, source } => {
            let inner = workflow_detail(source);
            let details = json!({ "requestId": request_id, "cause": inner.details });
            (format!("요청 {}: {}", request_id, inner.message_ko), Some(details))
        }
        WorkflowError::EmptyBatch => ("처리할 요청을 하나 이상 선택하세요".to_string(), None),
        WorkflowError::UnsupportedBulkStatus { status } => (
            format!(
                "{} 상태의 요청은 일괄 처리할 수 없습니다",
                status.label(shared::Language::Korean)
            ),
            Some(json!({ "status": status })),
        ),
    };

    ErrorDetail {
        code: error.code().to_string(),
        message_en: error.to_string(),
        message_ko,
        field: error.field().map(str::to_string),
        details,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_detail = match &self {
            AppError::Workflow(e) => workflow_detail(e),
            AppError::PartialCommit { succeeded, failed } => ErrorDetail {
                code: "PARTIAL_COMMIT".to_string(),
                message_en: format!(
                    "{} requests were updated and {} were not; retry only the failed requests",
                    succeeded.len(),
                    failed.len()
                ),
                message_ko: format!(
                    "{}건은 반영되었고 {}건은 반영되지 않았습니다. 실패한 요청만 다시 시도하세요",
                    succeeded.len(),
                    failed.len()
                ),
                field: None,
                details: Some(json!({ "succeeded": succeeded, "failed": failed })),
            },
            AppError::Unauthorized { message, message_ko } => ErrorDetail {
                code: "UNAUTHORIZED".to_string(),
                message_en: message.clone(),
                message_ko: message_ko.clone(),
                field: None,
                details: None,
            },
            AppError::NotFound(resource) => ErrorDetail {
                code: "NOT_FOUND".to_string(),
                message_en: format!("{} not found", resource),
                message_ko: format!("{}을(를) 찾을 수 없습니다", resource),
                field: None,
                details: None,
            },
            AppError::StorageError(msg) => ErrorDetail {
                code: "STORAGE_ERROR".to_string(),
                message_en: format!("Storage error: {}", msg),
                message_ko: format!("저장소 오류가 발생했습니다: {}", msg),
                field: None,
                details: None,
            },
            AppError::Configuration(msg) => ErrorDetail {
                code: "CONFIGURATION_ERROR".to_string(),
                message_en: format!("Configuration error: {}", msg),
                message_ko: format!("설정 오류가 발생했습니다: {}", msg),
                field: None,
                details: None,
            },
            AppError::DatabaseError(_) => ErrorDetail {
                code: "DATABASE_ERROR".to_string(),
                message_en: "A database error occurred".to_string(),
                message_ko: "데이터베이스 오류가 발생했습니다".to_string(),
                field: None,
                details: None,
            },
            AppError::Serialization(_) => ErrorDetail {
                code: "SERIALIZATION_ERROR".to_string(),
                message_en: "A stored record could not be read".to_string(),
                message_ko: "저장된 데이터를 읽을 수 없습니다".to_string(),
                field: None,
                details: None,
            },
            AppError::InternalError(_) => ErrorDetail {
                code: "INTERNAL_ERROR".to_string(),
                message_en: "An internal server error occurred".to_string(),
                message_ko: "서버 내부 오류가 발생했습니다".to_string(),
                field: None,
                details: None,
            },
        };

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!("Rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
