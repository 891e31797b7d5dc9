//! Workflow error taxonomy
//!
//! Every rejection carries enough structure (field, expected vs. actual
//! status, quantities) for a host to render a precise message.

use thiserror::Error;

use crate::models::RequestStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    /// The request is not in the status the transition starts from
    #[error("request {request_id} is {actual}, expected {}", join_statuses(.expected))]
    StateMismatch {
        request_id: String,
        expected: Vec<RequestStatus>,
        actual: RequestStatus,
    },

    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    /// Planned dispatch total exceeds what the warehouse received
    #[error("dispatch total {requested} exceeds received quantity {available}")]
    CapacityExceeded { requested: u64, available: u32 },

    #[error("bulk operation requires requests in one status, found {}", join_statuses(.statuses))]
    MixedState { statuses: Vec<RequestStatus> },

    #[error("request {request_id} is already {status}")]
    TerminalState {
        request_id: String,
        status: RequestStatus,
    },

    /// One member of a bulk operation failed; the whole batch is rejected
    #[error("request {request_id}: {source}")]
    BulkItem {
        request_id: String,
        source: Box<WorkflowError>,
    },

    #[error("bulk operation requires at least one request")]
    EmptyBatch,

    #[error("requests in {status} have no bulk transition")]
    UnsupportedBulkStatus { status: RequestStatus },
}

impl WorkflowError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        WorkflowError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::StateMismatch { .. } => "STATE_MISMATCH",
            WorkflowError::Validation { .. } => "VALIDATION_ERROR",
            WorkflowError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            WorkflowError::MixedState { .. } => "MIXED_STATE",
            WorkflowError::TerminalState { .. } => "TERMINAL_STATE",
            WorkflowError::BulkItem { source, .. } => source.code(),
            WorkflowError::EmptyBatch => "EMPTY_BATCH",
            WorkflowError::UnsupportedBulkStatus { .. } => "UNSUPPORTED_BULK_STATUS",
        }
    }

    /// Name of the offending input field, if the error is about one
    pub fn field(&self) -> Option<&str> {
        match self {
            WorkflowError::Validation { field, .. } => Some(field),
            WorkflowError::BulkItem { source, .. } => source.field(),
            WorkflowError::CapacityExceeded { .. } => Some("branchDispatchQuantities"),
            _ => None,
        }
    }

    /// Request that caused a bulk rejection
    pub fn failing_request(&self) -> Option<&str> {
        match self {
            WorkflowError::BulkItem { request_id, .. } => Some(request_id),
            WorkflowError::StateMismatch { request_id, .. }
            | WorkflowError::TerminalState { request_id, .. } => Some(request_id),
            _ => None,
        }
    }

    /// Whether re-reading and retrying can succeed without new input
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkflowError::StateMismatch { .. } => true,
            WorkflowError::BulkItem { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Bulk wrapper naming the failing item
    pub(crate) fn for_item(self, request_id: &str) -> Self {
        WorkflowError::BulkItem {
            request_id: request_id.to_string(),
            source: Box::new(self),
        }
    }
}

fn join_statuses(statuses: &[RequestStatus]) -> String {
    statuses
        .iter()
        .map(RequestStatus::as_str)
        .collect::<Vec<_>>()
        .join(" | ")
}
