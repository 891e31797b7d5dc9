//! Purchase request state machine
//!
//! [`apply`] is the only way to move a request between stages. It never
//! mutates the request: it validates the transition against the current
//! stage and returns a [`RequestUpdate`] (new stage, responsible team and
//! exactly one history entry) that the persistence layer commits.
//!
//! ```text
//! operations_submitted ─▶ ecount_registered ─▶ po_completed ─▶ warehouse_received
//!          └────────────────────────────────────▲                    │
//!                                                 partial_dispatched ◀┤
//!                                                        │            ▼
//!                                                        └─▶ branch_dispatched ─▶ branch_received_confirmed
//! ```
//! Any non-terminal status may also go to `logistics_issue_reported` or
//! `process_terminated`; `alternative_sourcing` follows an issue report.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::models::{
    Confirmed, DispatchLedger, Dispatching, IssueType, ItemGroup, LogisticsIssue, Ordered,
    PurchaseOrder, PurchaseRequest, Received, Registration, RequestStatus, SourcingMethod,
    SourcingPlan, Stage, StatusHistoryEntry, Termination, UrgencyLevel, WarehouseReceipt,
};
use crate::types::{Actor, ResponsibleTeam};
use crate::validation;

/// E-COUNT registration (also used to correct the classification while
/// still registered)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationInput {
    #[serde(default)]
    pub item_group: Option<ItemGroup>,
}

/// Purchase order completion, optionally registering in the same step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderInput {
    #[serde(default)]
    pub item_group: Option<ItemGroup>,
    #[serde(default)]
    pub expected_delivery_date: Option<NaiveDate>,
    #[serde(default)]
    pub expected_delivery_quantity: Option<u32>,
    #[serde(default)]
    pub actual_supplier: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptInput {
    #[serde(default)]
    pub actual_receipt_date: Option<NaiveDate>,
    #[serde(default)]
    pub actual_received_quantity: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DispatchInput {
    pub branch_dispatch_quantities: DispatchLedger,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BranchConfirmation {
    pub branch_id: String,
    #[serde(default)]
    pub confirmed_quantity: Option<u32>,
    #[serde(default)]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationInput {
    pub confirmations: Vec<BranchConfirmation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct IssueInput {
    #[serde(default)]
    pub issue_type: Option<IssueType>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub urgency: Option<UrgencyLevel>,
    #[serde(default)]
    pub alternative_sourcing_required: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SourcingInput {
    #[serde(default)]
    pub method: Option<SourcingMethod>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TerminationInput {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub final_notes: Option<String>,
}

/// Transition-specific input. Required fields are optional here so that a
/// missing one is reported as a validation error naming it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionInput {
    RegisterEcount(RegistrationInput),
    CompletePurchaseOrder(PurchaseOrderInput),
    ReceiveAtWarehouse(ReceiptInput),
    DispatchToBranches(DispatchInput),
    ConfirmBranchReceipt(ConfirmationInput),
    ReportLogisticsIssue(IssueInput),
    StartAlternativeSourcing(SourcingInput),
    Terminate(TerminationInput),
}

impl TransitionInput {
    /// Statuses this transition may start from
    pub fn source_statuses(&self) -> Vec<RequestStatus> {
        use RequestStatus::*;
        match self {
            TransitionInput::RegisterEcount(_) | TransitionInput::CompletePurchaseOrder(_) => {
                vec![OperationsSubmitted, EcountRegistered]
            }
            TransitionInput::ReceiveAtWarehouse(_) => vec![PoCompleted],
            TransitionInput::DispatchToBranches(_) => vec![WarehouseReceived, PartialDispatched],
            TransitionInput::ConfirmBranchReceipt(_) => vec![BranchDispatched],
            TransitionInput::StartAlternativeSourcing(_) => vec![LogisticsIssueReported],
            TransitionInput::ReportLogisticsIssue(_) | TransitionInput::Terminate(_) => {
                RequestStatus::non_terminal()
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransitionInput::RegisterEcount(_) => "register_ecount",
            TransitionInput::CompletePurchaseOrder(_) => "complete_purchase_order",
            TransitionInput::ReceiveAtWarehouse(_) => "receive_at_warehouse",
            TransitionInput::DispatchToBranches(_) => "dispatch_to_branches",
            TransitionInput::ConfirmBranchReceipt(_) => "confirm_branch_receipt",
            TransitionInput::ReportLogisticsIssue(_) => "report_logistics_issue",
            TransitionInput::StartAlternativeSourcing(_) => "start_alternative_sourcing",
            TransitionInput::Terminate(_) => "terminate",
        }
    }
}

/// A transition as submitted by a caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub input: TransitionInput,
    #[serde(default)]
    pub comments: Option<String>,
}

impl Transition {
    pub fn new(input: TransitionInput) -> Self {
        Self {
            input,
            comments: None,
        }
    }

    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }
}

/// Field diff produced by a successful transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestUpdate {
    id: Uuid,
    request_id: String,
    from: RequestStatus,
    version: u64,
    stage: Stage,
    responsible_team: ResponsibleTeam,
    entry: StatusHistoryEntry,
}

impl RequestUpdate {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Status the update was computed against
    pub fn from(&self) -> RequestStatus {
        self.from
    }

    /// Request version the update was computed against
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn to(&self) -> RequestStatus {
        self.stage.status()
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn responsible_team(&self) -> ResponsibleTeam {
        self.responsible_team
    }

    pub fn entry(&self) -> &StatusHistoryEntry {
        &self.entry
    }

    /// Remaining warehouse quantity after a dispatch
    pub fn remaining_quantity(&self) -> Option<u32> {
        self.stage.remaining_quantity()
    }
}

/// Validate `transition` against `request` and compute its update.
pub fn apply(
    request: &PurchaseRequest,
    transition: &Transition,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<RequestUpdate, WorkflowError> {
    let current = request.status();
    if current.is_terminal() {
        return Err(WorkflowError::TerminalState {
            request_id: request.request_id.clone(),
            status: current,
        });
    }

    let expected = transition.input.source_statuses();
    if !expected.contains(&current) {
        return Err(WorkflowError::StateMismatch {
            request_id: request.request_id.clone(),
            expected,
            actual: current,
        });
    }

    validation::validate_actor(actor).map_err(|m| WorkflowError::validation("actor", m))?;

    let (stage, team, summary) = match &transition.input {
        TransitionInput::RegisterEcount(input) => register(request, input, now)?,
        TransitionInput::CompletePurchaseOrder(input) => complete_order(request, input, now)?,
        TransitionInput::ReceiveAtWarehouse(input) => receive(request, input, now)?,
        TransitionInput::DispatchToBranches(input) => dispatch(request, input, now)?,
        TransitionInput::ConfirmBranchReceipt(input) => confirm(request, input, now)?,
        TransitionInput::ReportLogisticsIssue(input) => report_issue(request, input, now)?,
        TransitionInput::StartAlternativeSourcing(input) => start_sourcing(request, input, now)?,
        TransitionInput::Terminate(input) => terminate(request, input, now)?,
    };

    let comments = validation::non_blank(transition.comments.as_deref()).unwrap_or(summary);
    let entry = StatusHistoryEntry::new(stage.status(), actor, now, comments);

    Ok(RequestUpdate {
        id: request.id,
        request_id: request.request_id.clone(),
        from: current,
        version: request.version(),
        stage,
        responsible_team: team,
        entry,
    })
}

type Outcome = (Stage, ResponsibleTeam, String);

fn invalid(field: &str, message: &str) -> WorkflowError {
    WorkflowError::validation(field, message)
}

fn item_group(group: &ItemGroup) -> Result<ItemGroup, WorkflowError> {
    validation::validate_item_group(group).map_err(|(field, message)| invalid(field, message))?;
    Ok(ItemGroup::new(
        group.level1.trim(),
        group.level2.trim(),
        group.level3.trim(),
    ))
}

fn register(
    request: &PurchaseRequest,
    input: &RegistrationInput,
    now: DateTime<Utc>,
) -> Result<Outcome, WorkflowError> {
    let group = input
        .item_group
        .as_ref()
        .ok_or_else(|| invalid("itemGroup", "item group is required"))?;
    let group = item_group(group)?;

    let summary = if request.status() == RequestStatus::EcountRegistered {
        format!("Item group corrected to {} / {} / {}", group.level1, group.level2, group.level3)
    } else {
        format!("Registered in E-COUNT as {} / {} / {}", group.level1, group.level2, group.level3)
    };
    let registration = Registration {
        item_group: Some(group),
        registered_at: now,
    };
    Ok((Stage::EcountRegistered(registration), ResponsibleTeam::Logistics, summary))
}

fn complete_order(
    request: &PurchaseRequest,
    input: &PurchaseOrderInput,
    now: DateTime<Utc>,
) -> Result<Outcome, WorkflowError> {
    let group = match &input.item_group {
        Some(group) => Some(item_group(group)?),
        None => request.stage().registration().and_then(|r| r.item_group.clone()),
    };

    if input.expected_delivery_quantity == Some(0) {
        return Err(invalid("expectedDeliveryQuantity", "must be greater than 0"));
    }
    let supplier = validation::resolve_supplier(
        input.actual_supplier.as_deref(),
        request.part.initial_supplier.as_deref(),
    );

    // Either a full classification or full delivery terms
    if group.is_none() {
        if input.expected_delivery_date.is_none() {
            return Err(invalid(
                "expectedDeliveryDate",
                "is required when no item group is given",
            ));
        }
        if input.expected_delivery_quantity.is_none() {
            return Err(invalid(
                "expectedDeliveryQuantity",
                "is required when no item group is given",
            ));
        }
        if supplier.is_none() {
            return Err(invalid("actualSupplier", "is required when no item group is given"));
        }
    }

    let registration = match request.stage().registration() {
        Some(existing) if input.item_group.is_none() => existing.clone(),
        _ => Registration {
            item_group: group,
            registered_at: now,
        },
    };
    let order = PurchaseOrder {
        expected_delivery_date: input.expected_delivery_date,
        expected_delivery_quantity: input.expected_delivery_quantity,
        supplier,
        ordered_at: now,
    };

    let mut summary = "Purchase order completed".to_string();
    if let Some(supplier) = &order.supplier {
        summary.push_str(&format!(" with {}", supplier));
    }
    if let (Some(date), Some(quantity)) = (order.expected_delivery_date, order.expected_delivery_quantity) {
        summary.push_str(&format!(", {} units expected {}", quantity, date));
    }

    Ok((
        Stage::PoCompleted(Ordered {
            registration,
            order,
        }),
        ResponsibleTeam::Logistics,
        summary,
    ))
}

fn receive(
    request: &PurchaseRequest,
    input: &ReceiptInput,
    now: DateTime<Utc>,
) -> Result<Outcome, WorkflowError> {
    let Stage::PoCompleted(ordered) = request.stage() else {
        return Err(mismatch(request, &[RequestStatus::PoCompleted]));
    };
    let date = input
        .actual_receipt_date
        .ok_or_else(|| invalid("actualReceiptDate", "is required"))?;
    let quantity = validation::require_positive_quantity(input.actual_received_quantity)
        .map_err(|m| invalid("actualReceivedQuantity", m))?;

    let received = Received {
        registration: ordered.registration.clone(),
        order: ordered.order.clone(),
        receipt: WarehouseReceipt {
            actual_receipt_date: date,
            actual_received_quantity: quantity,
            received_at: now,
        },
    };
    let summary = format!("Received {} units at warehouse on {}", quantity, date);
    Ok((Stage::WarehouseReceived(received), ResponsibleTeam::Logistics, summary))
}

fn dispatch(
    request: &PurchaseRequest,
    input: &DispatchInput,
    now: DateTime<Utc>,
) -> Result<Outcome, WorkflowError> {
    let (registration, order, receipt, committed) = match request.stage() {
        Stage::WarehouseReceived(s) => (&s.registration, &s.order, &s.receipt, None),
        Stage::PartialDispatched(s) => (
            &s.registration,
            &s.order,
            &s.receipt,
            Some(&s.branch_dispatch_quantities),
        ),
        _ => {
            return Err(mismatch(
                request,
                &[RequestStatus::WarehouseReceived, RequestStatus::PartialDispatched],
            ))
        }
    };

    let ledger = normalize_ledger(request, &input.branch_dispatch_quantities)?;
    if !ledger.any_dispatched() {
        return Err(invalid(
            "branchDispatchQuantities",
            "at least one branch must be dispatched",
        ));
    }

    // Rows committed by an earlier partial dispatch are frozen
    if let Some(committed) = committed {
        for done in committed.rows().iter().filter(|r| r.is_dispatched) {
            let unchanged = ledger
                .row(&done.branch_id)
                .map(|r| r.is_dispatched && r.dispatched_quantity == done.dispatched_quantity)
                .unwrap_or(false);
            if !unchanged {
                return Err(WorkflowError::validation(
                    format!("branchDispatchQuantities[{}]", done.branch_id),
                    "branch was already dispatched and cannot be changed",
                ));
            }
        }
    }

    let remaining_quantity = ledger.check_capacity(receipt.actual_received_quantity)?;
    let fully = ledger.is_fully_dispatched();

    let newly: Vec<String> = ledger
        .rows()
        .iter()
        .filter(|r| r.is_dispatched)
        .filter(|r| !committed.and_then(|c| c.row(&r.branch_id)).map(|c| c.is_dispatched).unwrap_or(false))
        .map(|r| format!("{} {}", r.branch_name, r.dispatched_quantity))
        .collect();
    let summary = format!(
        "Dispatched to {}; remaining {}",
        newly.join(", "),
        remaining_quantity
    );

    let dispatching = Dispatching {
        registration: registration.clone(),
        order: order.clone(),
        receipt: receipt.clone(),
        branch_dispatch_quantities: ledger,
        remaining_quantity,
        dispatched_at: now,
    };
    let outcome = if fully {
        (Stage::BranchDispatched(dispatching), ResponsibleTeam::Operations, summary)
    } else {
        (Stage::PartialDispatched(dispatching), ResponsibleTeam::Logistics, summary)
    };
    Ok(outcome)
}

/// Check the submitted rows cover exactly the request's branches and pin
/// `requiredQuantity` to the original requirement
fn normalize_ledger(
    request: &PurchaseRequest,
    submitted: &DispatchLedger,
) -> Result<DispatchLedger, WorkflowError> {
    let requirements = request.branch_requirements();
    for row in submitted.rows() {
        if !requirements.iter().any(|r| r.branch_id == row.branch_id) {
            return Err(WorkflowError::validation(
                format!("branchDispatchQuantities[{}]", row.branch_id),
                "branch is not part of this request",
            ));
        }
    }
    if submitted.len() != requirements.len() {
        return Err(invalid(
            "branchDispatchQuantities",
            "every requested branch needs exactly one row",
        ));
    }

    let mut ledger = submitted.clone();
    for row in ledger.rows_mut() {
        if let Some(requirement) = requirements.iter().find(|r| r.branch_id == row.branch_id) {
            row.required_quantity = requirement.requested_quantity;
            if row.branch_name.trim().is_empty() {
                row.branch_name = requirement.branch_name.clone();
            }
        }
        row.confirmed_quantity = None;
        row.branch_receipt_memo = None;
    }
    Ok(ledger)
}

fn confirm(
    request: &PurchaseRequest,
    input: &ConfirmationInput,
    now: DateTime<Utc>,
) -> Result<Outcome, WorkflowError> {
    let Stage::BranchDispatched(dispatched) = request.stage() else {
        return Err(mismatch(request, &[RequestStatus::BranchDispatched]));
    };

    for confirmation in &input.confirmations {
        if dispatched.branch_dispatch_quantities.row(&confirmation.branch_id).is_none() {
            return Err(WorkflowError::validation(
                format!("confirmations[{}]", confirmation.branch_id),
                "branch is not part of this request",
            ));
        }
    }

    let mut ledger = dispatched.branch_dispatch_quantities.clone();
    let mut total_confirmed = 0u64;
    for row in ledger.rows_mut() {
        let confirmed = input
            .confirmations
            .iter()
            .find(|c| c.branch_id == row.branch_id)
            .and_then(|c| c.confirmed_quantity.map(|q| (q, c.memo.clone())));
        let Some((quantity, memo)) = confirmed else {
            return Err(WorkflowError::validation(
                format!("branchDispatchQuantities[{}].confirmedQuantity", row.branch_id),
                "confirmed quantity is required for every branch",
            ));
        };
        row.confirmed_quantity = Some(quantity);
        row.branch_receipt_memo = validation::non_blank(memo.as_deref());
        total_confirmed += u64::from(quantity);
    }

    let summary = format!(
        "Branch receipt confirmed for {} branches ({} units)",
        ledger.len(),
        total_confirmed
    );
    let confirmed = Confirmed {
        registration: dispatched.registration.clone(),
        order: dispatched.order.clone(),
        receipt: dispatched.receipt.clone(),
        branch_dispatch_quantities: ledger,
        remaining_quantity: dispatched.remaining_quantity,
        confirmed_at: now,
    };
    Ok((Stage::BranchReceivedConfirmed(confirmed), ResponsibleTeam::Completed, summary))
}

fn report_issue(
    request: &PurchaseRequest,
    input: &IssueInput,
    now: DateTime<Utc>,
) -> Result<Outcome, WorkflowError> {
    let issue_type = input
        .issue_type
        .ok_or_else(|| invalid("issueType", "is required"))?;
    let description = validation::require_text(input.description.as_deref())
        .map_err(|m| invalid("description", m))?;
    let urgency = input.urgency.ok_or_else(|| invalid("urgency", "is required"))?;
    let alternative_sourcing_required = input
        .alternative_sourcing_required
        .ok_or_else(|| invalid("alternativeSourcingRequired", "is required"))?;

    let summary = format!("Logistics issue reported: {}", description);
    let stage = Stage::LogisticsIssueReported {
        prior: Box::new(request.stage().progress().clone()),
        issue: LogisticsIssue {
            issue_type,
            description,
            urgency,
            alternative_sourcing_required,
            reported_at: now,
        },
    };
    Ok((stage, request.responsible_team(), summary))
}

fn start_sourcing(
    request: &PurchaseRequest,
    input: &SourcingInput,
    now: DateTime<Utc>,
) -> Result<Outcome, WorkflowError> {
    let Stage::LogisticsIssueReported { prior, issue } = request.stage() else {
        return Err(mismatch(request, &[RequestStatus::LogisticsIssueReported]));
    };
    let method = input.method.ok_or_else(|| invalid("method", "is required"))?;
    let description = validation::require_text(input.description.as_deref())
        .map_err(|m| invalid("description", m))?;

    let summary = format!("Alternative sourcing started: {}", description);
    let stage = Stage::AlternativeSourcing {
        prior: prior.clone(),
        issue: issue.clone(),
        sourcing: SourcingPlan {
            method,
            description,
            started_at: now,
        },
    };
    Ok((stage, request.responsible_team(), summary))
}

fn terminate(
    request: &PurchaseRequest,
    input: &TerminationInput,
    now: DateTime<Utc>,
) -> Result<Outcome, WorkflowError> {
    let reason =
        validation::require_text(input.reason.as_deref()).map_err(|m| invalid("reason", m))?;
    let final_notes = validation::require_text(input.final_notes.as_deref())
        .map_err(|m| invalid("finalNotes", m))?;

    let summary = format!("Process terminated: {}", reason);
    let stage = Stage::ProcessTerminated {
        prior: Box::new(request.stage().clone()),
        termination: Termination {
            reason,
            final_notes,
            terminated_at: now,
        },
    };
    Ok((stage, ResponsibleTeam::Completed, summary))
}

fn mismatch(request: &PurchaseRequest, expected: &[RequestStatus]) -> WorkflowError {
    WorkflowError::StateMismatch {
        request_id: request.request_id.clone(),
        expected: expected.to_vec(),
        actual: request.status(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BranchRequirement, CreateRequestInput, RecordIds};
    use crate::types::Importance;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn actor() -> Actor {
        Actor::new("u-logi", "Park")
    }

    fn new_request() -> PurchaseRequest {
        let input = CreateRequestInput {
            part_number: "BRK-1002".into(),
            part_name: "Brake pad".into(),
            price: None,
            currency: None,
            initial_supplier: Some("Hanil Parts".into()),
            importance: Importance::High,
            branch_requirements: vec![
                BranchRequirement::new("b-a", "Branch A", 60),
                BranchRequirement::new("b-b", "Branch B", 50),
            ],
            logistics_stock_quantity: 0,
            notes: None,
        };
        let ids = RecordIds {
            id: Uuid::from_u128(7),
            request_id: "REQ-20240301090000000-ABCDEF".into(),
        };
        PurchaseRequest::submit(&input, ids, None, &Actor::new("u-ops", "Kim"), t0()).unwrap()
    }

    fn step(request: &mut PurchaseRequest, input: TransitionInput, minutes: i64) -> RequestUpdate {
        let update = apply(request, &Transition::new(input), &actor(), t0() + Duration::minutes(minutes))
            .unwrap();
        request.apply_update(&update).unwrap();
        update
    }

    fn order_input() -> TransitionInput {
        TransitionInput::CompletePurchaseOrder(PurchaseOrderInput {
            item_group: Some(ItemGroup::new("Brakes", "Disc", "Pads")),
            expected_delivery_date: NaiveDate::from_ymd_opt(2024, 3, 10),
            expected_delivery_quantity: Some(110),
            actual_supplier: None,
        })
    }

    fn receipt_input(quantity: u32) -> TransitionInput {
        TransitionInput::ReceiveAtWarehouse(ReceiptInput {
            actual_receipt_date: NaiveDate::from_ymd_opt(2024, 3, 9),
            actual_received_quantity: Some(quantity),
        })
    }

    fn received_request() -> PurchaseRequest {
        let mut request = new_request();
        step(&mut request, order_input(), 1);
        step(&mut request, receipt_input(100), 2);
        request
    }

    fn dispatch_input(request: &PurchaseRequest, rows: &[(&str, u32)]) -> TransitionInput {
        let mut ledger = request.dispatch_draft();
        for (branch, quantity) in rows {
            ledger.set_quantity(branch, *quantity).unwrap();
            ledger.set_dispatched(branch, true).unwrap();
        }
        TransitionInput::DispatchToBranches(DispatchInput {
            branch_dispatch_quantities: ledger,
        })
    }

    #[test]
    fn test_fast_path_to_po_completed() {
        let mut request = new_request();
        let update = step(&mut request, order_input(), 1);

        assert_eq!(update.from(), RequestStatus::OperationsSubmitted);
        assert_eq!(request.status(), RequestStatus::PoCompleted);
        assert_eq!(request.responsible_team(), ResponsibleTeam::Logistics);
        let order = request.stage().order().unwrap();
        assert_eq!(order.supplier.as_deref(), Some("Hanil Parts"));
        assert_eq!(request.history().len(), 2);
    }

    #[test]
    fn test_explicit_supplier_overrides_initial() {
        let request = new_request();
        let input = TransitionInput::CompletePurchaseOrder(PurchaseOrderInput {
            item_group: None,
            expected_delivery_date: NaiveDate::from_ymd_opt(2024, 3, 10),
            expected_delivery_quantity: Some(5),
            actual_supplier: Some("Daesung".into()),
        });
        let update = apply(&request, &Transition::new(input), &actor(), t0()).unwrap();
        assert_eq!(update.stage().order().unwrap().supplier.as_deref(), Some("Daesung"));
    }

    #[test]
    fn test_order_without_group_needs_delivery_terms() {
        let request = new_request();
        let input = TransitionInput::CompletePurchaseOrder(PurchaseOrderInput {
            expected_delivery_date: NaiveDate::from_ymd_opt(2024, 3, 10),
            ..Default::default()
        });
        let err = apply(&request, &Transition::new(input), &actor(), t0()).unwrap_err();
        assert_eq!(err.field(), Some("expectedDeliveryQuantity"));

        let zero = TransitionInput::CompletePurchaseOrder(PurchaseOrderInput {
            item_group: Some(ItemGroup::new("a", "b", "c")),
            expected_delivery_quantity: Some(0),
            ..Default::default()
        });
        let err = apply(&request, &Transition::new(zero), &actor(), t0()).unwrap_err();
        assert_eq!(err.field(), Some("expectedDeliveryQuantity"));
    }

    #[test]
    fn test_registration_then_correction() {
        let mut request = new_request();
        let register = |group: ItemGroup| {
            TransitionInput::RegisterEcount(RegistrationInput {
                item_group: Some(group),
            })
        };
        step(&mut request, register(ItemGroup::new("Brakes", "Disc", "Pads")), 1);
        step(&mut request, register(ItemGroup::new("Brakes", "Drum", "Shoes")), 2);

        assert_eq!(request.status(), RequestStatus::EcountRegistered);
        assert_eq!(request.history().len(), 3);
        let group = request.stage().registration().unwrap().item_group.clone().unwrap();
        assert_eq!(group.level2, "Drum");

        // Registered classification carries into the purchase order
        let input = TransitionInput::CompletePurchaseOrder(PurchaseOrderInput::default());
        step(&mut request, input, 3);
        let group = request.stage().registration().unwrap().item_group.clone().unwrap();
        assert_eq!(group.level3, "Shoes");

        // No more classification edits after the order
        let err = apply(
            &request,
            &Transition::new(register(ItemGroup::new("x", "y", "z"))),
            &actor(),
            t0(),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::StateMismatch { .. }));
    }

    #[test]
    fn test_receipt_requires_date_and_quantity() {
        let mut request = new_request();
        step(&mut request, order_input(), 1);

        let missing_date = TransitionInput::ReceiveAtWarehouse(ReceiptInput {
            actual_receipt_date: None,
            actual_received_quantity: Some(10),
        });
        let err = apply(&request, &Transition::new(missing_date), &actor(), t0()).unwrap_err();
        assert_eq!(err.field(), Some("actualReceiptDate"));

        let err = apply(&request, &Transition::new(receipt_input(0)), &actor(), t0()).unwrap_err();
        assert_eq!(err.field(), Some("actualReceivedQuantity"));
        assert_eq!(request.status(), RequestStatus::PoCompleted);
    }

    #[test]
    fn test_dispatch_over_capacity_is_rejected() {
        let request = received_request();
        let input = dispatch_input(&request, &[("b-a", 60), ("b-b", 50)]);
        let err = apply(&request, &Transition::new(input), &actor(), t0()).unwrap_err();
        assert_eq!(
            err,
            WorkflowError::CapacityExceeded {
                requested: 110,
                available: 100
            }
        );
    }

    #[test]
    fn test_dispatch_total_beyond_u32_is_rejected() {
        let mut request = new_request();
        step(&mut request, order_input(), 1);
        step(&mut request, receipt_input(10), 2);

        let input = dispatch_input(&request, &[("b-a", 1 << 31), ("b-b", 1 << 31)]);
        let err = apply(&request, &Transition::new(input), &actor(), t0()).unwrap_err();
        assert_eq!(
            err,
            WorkflowError::CapacityExceeded {
                requested: 1u64 << 32,
                available: 10
            }
        );
        assert_eq!(request.status(), RequestStatus::WarehouseReceived);
    }

    #[test]
    fn test_partial_then_full_dispatch() {
        let mut request = received_request();
        let input = dispatch_input(&request, &[("b-a", 60)]);
        let update = step(&mut request, input, 3);
        assert_eq!(request.status(), RequestStatus::PartialDispatched);
        assert_eq!(request.responsible_team(), ResponsibleTeam::Logistics);
        assert_eq!(update.remaining_quantity(), Some(40));

        let input = dispatch_input(&request, &[("b-b", 40)]);
        let update = step(&mut request, input, 4);
        assert_eq!(request.status(), RequestStatus::BranchDispatched);
        assert_eq!(request.responsible_team(), ResponsibleTeam::Operations);
        assert_eq!(update.remaining_quantity(), Some(0));
    }

    #[test]
    fn test_committed_rows_are_frozen() {
        let mut request = received_request();
        let input = dispatch_input(&request, &[("b-a", 60)]);
        step(&mut request, input, 3);

        let mut ledger = request.dispatch_draft();
        ledger.undo("b-a").unwrap();
        ledger.set_dispatched("b-b", true).unwrap();
        let input = TransitionInput::DispatchToBranches(DispatchInput {
            branch_dispatch_quantities: ledger,
        });
        let err = apply(&request, &Transition::new(input), &actor(), t0()).unwrap_err();
        assert_eq!(err.field(), Some("branchDispatchQuantities[b-a]"));
    }

    #[test]
    fn test_dispatch_requires_one_toggled_branch() {
        let request = received_request();
        let input = TransitionInput::DispatchToBranches(DispatchInput {
            branch_dispatch_quantities: request.dispatch_draft(),
        });
        let err = apply(&request, &Transition::new(input), &actor(), t0()).unwrap_err();
        assert_eq!(err.field(), Some("branchDispatchQuantities"));
    }

    #[test]
    fn test_confirmation_completes_request() {
        let mut request = received_request();
        let input = dispatch_input(&request, &[("b-a", 60), ("b-b", 40)]);
        step(&mut request, input, 3);

        let partial = TransitionInput::ConfirmBranchReceipt(ConfirmationInput {
            confirmations: vec![BranchConfirmation {
                branch_id: "b-a".into(),
                confirmed_quantity: Some(60),
                memo: None,
            }],
        });
        let err = apply(&request, &Transition::new(partial), &actor(), t0()).unwrap_err();
        assert_eq!(err.field(), Some("branchDispatchQuantities[b-b].confirmedQuantity"));

        let full = TransitionInput::ConfirmBranchReceipt(ConfirmationInput {
            confirmations: vec![
                BranchConfirmation {
                    branch_id: "b-a".into(),
                    confirmed_quantity: Some(60),
                    memo: Some("ok".into()),
                },
                BranchConfirmation {
                    branch_id: "b-b".into(),
                    confirmed_quantity: Some(0),
                    memo: None,
                },
            ],
        });
        step(&mut request, full, 4);
        assert_eq!(request.status(), RequestStatus::BranchReceivedConfirmed);
        assert_eq!(request.responsible_team(), ResponsibleTeam::Completed);
        assert_eq!(request.ledger().unwrap().row("b-b").unwrap().confirmed_quantity, Some(0));
    }

    #[test]
    fn test_issue_then_sourcing_keeps_team_and_progress() {
        let mut request = received_request();
        let issue = TransitionInput::ReportLogisticsIssue(IssueInput {
            issue_type: Some(IssueType::QualityDefect),
            description: Some("cracked housings".into()),
            urgency: Some(UrgencyLevel::High),
            alternative_sourcing_required: Some(true),
        });
        step(&mut request, issue, 3);
        assert_eq!(request.status(), RequestStatus::LogisticsIssueReported);
        assert_eq!(request.responsible_team(), ResponsibleTeam::Logistics);
        assert_eq!(request.actual_received_quantity(), Some(100));

        let missing = TransitionInput::StartAlternativeSourcing(SourcingInput {
            method: Some(SourcingMethod::AlternativeSupplier),
            description: None,
        });
        let err = apply(&request, &Transition::new(missing), &actor(), t0()).unwrap_err();
        assert_eq!(err.field(), Some("description"));

        let sourcing = TransitionInput::StartAlternativeSourcing(SourcingInput {
            method: Some(SourcingMethod::AlternativeSupplier),
            description: Some("order from Daesung".into()),
        });
        step(&mut request, sourcing, 4);
        assert_eq!(request.status(), RequestStatus::AlternativeSourcing);
        assert!(request.stage().issue().unwrap().alternative_sourcing_required);
    }

    #[test]
    fn test_issue_requires_all_fields() {
        let request = new_request();
        let input = TransitionInput::ReportLogisticsIssue(IssueInput {
            issue_type: Some(IssueType::DeliveryDelay),
            description: Some("late".into()),
            urgency: Some(UrgencyLevel::Low),
            alternative_sourcing_required: None,
        });
        let err = apply(&request, &Transition::new(input), &actor(), t0()).unwrap_err();
        assert_eq!(err.field(), Some("alternativeSourcingRequired"));
    }

    #[test]
    fn test_terminated_request_is_frozen() {
        let mut request = new_request();
        let terminate = TransitionInput::Terminate(TerminationInput {
            reason: Some("duplicate request".into()),
            final_notes: Some("merged into REQ-1".into()),
        });
        step(&mut request, terminate.clone(), 1);
        assert_eq!(request.status(), RequestStatus::ProcessTerminated);

        let before = request.clone();
        for input in [order_input(), terminate] {
            let err = apply(&request, &Transition::new(input), &actor(), t0()).unwrap_err();
            assert!(matches!(err, WorkflowError::TerminalState { .. }));
        }
        assert_eq!(request, before);
    }

    #[test]
    fn test_caller_comment_replaces_summary() {
        let request = new_request();
        let transition = Transition::new(order_input()).with_comments("urgent, call supplier");
        let update = apply(&request, &transition, &actor(), t0()).unwrap();
        assert_eq!(update.entry().comments, "urgent, call supplier");
        assert_eq!(update.entry().updated_by_uid, "u-logi");
    }

    #[test]
    fn test_stale_update_cannot_be_applied_twice() {
        let mut request = new_request();
        let update = apply(&request, &Transition::new(order_input()), &actor(), t0()).unwrap();
        request.apply_update(&update).unwrap();
        let err = request.apply_update(&update).unwrap_err();
        assert!(matches!(err, WorkflowError::StateMismatch { .. }));
        assert_eq!(request.history().len(), 2);
    }

    #[test]
    fn test_concurrent_correction_has_one_winner() {
        let mut request = new_request();
        let register = |level3: &str| {
            TransitionInput::RegisterEcount(RegistrationInput {
                item_group: Some(ItemGroup::new("Brakes", "Disc", level3)),
            })
        };
        step(&mut request, register("Pads"), 1);

        // Both corrections keep the status at ecount_registered
        let first = apply(&request, &Transition::new(register("Shoes")), &actor(), t0()).unwrap();
        let second = apply(&request, &Transition::new(register("Rotors")), &actor(), t0()).unwrap();
        assert_eq!(first.version(), second.version());

        request.apply_update(&first).unwrap();
        let err = request.apply_update(&second).unwrap_err();
        assert!(matches!(err, WorkflowError::StateMismatch { .. }));

        let group = request.stage().registration().unwrap().item_group.clone().unwrap();
        assert_eq!(group.level3, "Shoes");
        assert_eq!(request.history().len(), 3);
        assert_eq!(request.version(), 3);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            /// Committed dispatches never ship more than was received
            #[test]
            fn prop_dispatch_conserves_received_quantity(
                received in 1u32..200,
                plan in prop::collection::vec((0u32..120, any::<bool>()), 2..=2)
            ) {
                let mut request = new_request();
                step(&mut request, order_input(), 1);
                step(&mut request, receipt_input(received), 2);

                let mut ledger = request.dispatch_draft();
                for ((quantity, toggled), branch) in plan.iter().zip(["b-a", "b-b"]) {
                    ledger.set_quantity(branch, *quantity).unwrap();
                    ledger.set_dispatched(branch, *toggled).unwrap();
                }
                let input = TransitionInput::DispatchToBranches(DispatchInput {
                    branch_dispatch_quantities: ledger.clone(),
                });

                match apply(&request, &Transition::new(input), &actor(), t0()) {
                    Ok(update) => {
                        let committed = update.stage().ledger().unwrap();
                        let total = committed.total_planned();
                        prop_assert!(total <= u64::from(received));
                        prop_assert_eq!(
                            update.remaining_quantity().map(u64::from),
                            Some(u64::from(received) - total)
                        );
                    }
                    Err(WorkflowError::CapacityExceeded { requested, available }) => {
                        prop_assert!(requested > u64::from(available));
                        prop_assert_eq!(available, received);
                    }
                    Err(WorkflowError::Validation { .. }) => {
                        prop_assert!(!ledger.any_dispatched());
                    }
                    Err(other) => prop_assert!(false, "unexpected error {:?}", other),
                }
            }

            /// History only grows, one entry per accepted transition
            #[test]
            fn prop_history_is_append_only(choices in prop::collection::vec(0usize..4, 1..12)) {
                let mut request = new_request();
                for (minute, choice) in choices.into_iter().enumerate() {
                    let input = match choice {
                        0 => order_input(),
                        1 => receipt_input(100),
                        2 => TransitionInput::ReportLogisticsIssue(IssueInput {
                            issue_type: Some(IssueType::DeliveryDelay),
                            description: Some("late truck".into()),
                            urgency: Some(UrgencyLevel::Medium),
                            alternative_sourcing_required: Some(false),
                        }),
                        _ => TransitionInput::Terminate(TerminationInput {
                            reason: Some("cancelled".into()),
                            final_notes: Some("n/a".into()),
                        }),
                    };
                    let before = request.history().clone();
                    let at = t0() + Duration::minutes(minute as i64 + 1);
                    match apply(&request, &Transition::new(input), &actor(), at) {
                        Ok(update) => {
                            request.apply_update(&update).unwrap();
                            prop_assert_eq!(request.history().len(), before.len() + 1);
                            prop_assert!(request.history().extends(&before));
                        }
                        Err(_) => prop_assert_eq!(request.history(), &before),
                    }
                }
            }

            /// A terminated request rejects every transition, unchanged
            #[test]
            fn prop_terminated_request_is_frozen(choice in 0usize..5, received in 1u32..50) {
                let mut request = new_request();
                step(&mut request, TransitionInput::Terminate(TerminationInput {
                    reason: Some("cancelled".into()),
                    final_notes: Some("n/a".into()),
                }), 1);
                let frozen = request.clone();

                let input = match choice {
                    0 => order_input(),
                    1 => receipt_input(received),
                    2 => TransitionInput::RegisterEcount(RegistrationInput {
                        item_group: Some(ItemGroup::new("Brakes", "Disc", "Pads")),
                    }),
                    3 => TransitionInput::DispatchToBranches(DispatchInput {
                        branch_dispatch_quantities: request.dispatch_draft(),
                    }),
                    _ => TransitionInput::Terminate(TerminationInput {
                        reason: Some("again".into()),
                        final_notes: Some("n/a".into()),
                    }),
                };
                let err = apply(&request, &Transition::new(input), &actor(), t0()).unwrap_err();
                let is_terminal = matches!(err, WorkflowError::TerminalState { .. });
                prop_assert!(is_terminal);
                prop_assert_eq!(request, frozen);
            }
        }
    }
}
