//! Multi-part sets: groups of requests created together

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{CreateRequestInput, PurchaseRequest, RecordIds, RequestStatus, SetMembership};
use crate::error::WorkflowError;
use crate::types::{Actor, Importance};
use crate::validation;

/// Aggregate completion of a set
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    #[default]
    InProgress,
    PartialComplete,
    Complete,
}

/// Grouping record for a set purchase
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MultiPartRequest {
    set_id: String,
    pub set_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_description: Option<String>,
    requested_by: Actor,
    pub importance: Importance,
    total_parts_count: u32,
    /// Cached; recomputed by [`SetProgress`], never trusted for decisions
    completed_parts_count: u32,
    overall_status: OverallStatus,
    part_request_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MultiPartRequest {
    pub fn set_id(&self) -> &str {
        &self.set_id
    }

    pub fn requested_by(&self) -> &Actor {
        &self.requested_by
    }

    pub fn total_parts_count(&self) -> u32 {
        self.total_parts_count
    }

    pub fn completed_parts_count(&self) -> u32 {
        self.completed_parts_count
    }

    pub fn overall_status(&self) -> OverallStatus {
        self.overall_status
    }

    pub fn part_request_ids(&self) -> &[Uuid] {
        &self.part_request_ids
    }

    /// Refresh the cached summary from a freshly derived progress
    pub fn refresh(&mut self, progress: &SetProgress, now: DateTime<Utc>) {
        self.completed_parts_count = progress.completed;
        self.overall_status = progress.overall_status;
        self.updated_at = now;
    }
}

/// Input for creating a set of parts requested together
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSetInput {
    #[validate(length(min = 1, max = 200, message = "set name is required"))]
    pub set_name: String,
    #[serde(default)]
    pub set_description: Option<String>,
    #[serde(default)]
    pub importance: Importance,
    #[validate(length(min = 1, message = "a set needs at least one part"))]
    pub parts: Vec<CreateRequestInput>,
}

/// Derived completion view over the members of a set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SetProgress {
    pub set_id: String,
    pub total: u32,
    pub completed: u32,
    pub in_progress: u32,
    pub pending: u32,
    pub progress_percentage: Decimal,
    pub overall_status: OverallStatus,
}

impl SetProgress {
    /// Classify each member: confirmed at branch is completed, still
    /// submitted is pending, anything else is in progress.
    pub fn derive<I>(set_id: &str, statuses: I) -> Self
    where
        I: IntoIterator<Item = RequestStatus>,
    {
        let (mut completed, mut pending, mut in_progress) = (0u32, 0u32, 0u32);
        for status in statuses {
            match status {
                RequestStatus::BranchReceivedConfirmed => completed += 1,
                RequestStatus::OperationsSubmitted => pending += 1,
                _ => in_progress += 1,
            }
        }
        let total = completed + pending + in_progress;

        Self {
            set_id: set_id.to_string(),
            total,
            completed,
            in_progress,
            pending,
            progress_percentage: calculate_progress_percentage(completed, total),
            overall_status: overall_status(completed, total),
        }
    }

    pub fn from_members(set_id: &str, members: &[PurchaseRequest]) -> Self {
        Self::derive(set_id, members.iter().map(PurchaseRequest::status))
    }
}

/// 100 × completed / total, 0 for an empty set
pub fn calculate_progress_percentage(completed: u32, total: u32) -> Decimal {
    if total == 0 {
        Decimal::ZERO
    } else {
        Decimal::from(completed) * Decimal::from(100) / Decimal::from(total)
    }
}

fn overall_status(completed: u32, total: u32) -> OverallStatus {
    if total > 0 && completed == total {
        OverallStatus::Complete
    } else if completed > 0 {
        OverallStatus::PartialComplete
    } else {
        OverallStatus::InProgress
    }
}

/// Build every record of a set. Nothing is returned unless all parts are
/// valid, so callers can persist the result as one batch.
pub fn build_set(
    input: &CreateSetInput,
    set_id: &str,
    member_ids: Vec<RecordIds>,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<(MultiPartRequest, Vec<PurchaseRequest>), WorkflowError> {
    input
        .validate()
        .map_err(|errors| validation::first_violation(&errors, ""))?;
    if input.set_name.trim().is_empty() {
        return Err(WorkflowError::validation("setName", "set name is required"));
    }
    let members = build_members(&input.parts, member_ids, Some((set_id, input.set_name.trim())), actor, now)?;

    let set = MultiPartRequest {
        set_id: set_id.to_string(),
        set_name: input.set_name.trim().to_string(),
        set_description: input.set_description.clone(),
        requested_by: actor.clone(),
        importance: input.importance,
        total_parts_count: members.len() as u32,
        completed_parts_count: 0,
        overall_status: OverallStatus::InProgress,
        part_request_ids: members.iter().map(|m| m.id).collect(),
        created_at: now,
        updated_at: now,
    };
    Ok((set, members))
}

/// Build independent requests submitted together (no set record)
pub fn build_batch(
    parts: &[CreateRequestInput],
    member_ids: Vec<RecordIds>,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Vec<PurchaseRequest>, WorkflowError> {
    if parts.is_empty() {
        return Err(WorkflowError::validation("parts", "at least one part is required"));
    }
    build_members(parts, member_ids, None, actor, now)
}

fn build_members(
    parts: &[CreateRequestInput],
    member_ids: Vec<RecordIds>,
    set: Option<(&str, &str)>,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Vec<PurchaseRequest>, WorkflowError> {
    if member_ids.len() != parts.len() {
        return Err(WorkflowError::validation(
            "parts",
            format!("expected {} identifiers, got {}", parts.len(), member_ids.len()),
        ));
    }

    // Check every part first so the error names the part, not a half-built batch
    for (i, part) in parts.iter().enumerate() {
        part.check(&format!("parts[{}]", i))?;
    }

    parts
        .iter()
        .zip(member_ids)
        .enumerate()
        .map(|(i, (part, ids))| {
            let membership = set.map(|(set_id, set_name)| SetMembership {
                set_id: set_id.to_string(),
                set_name: set_name.to_string(),
                part_order_in_set: i as u32 + 1,
            });
            PurchaseRequest::submit(part, ids, membership, actor, now)
        })
        .collect()
}
