//! Purchase request model
//!
//! A request's stage-specific data lives in [`Stage`], a tagged union keyed by
//! status. Each variant carries only the fields that exist at that point of
//! the workflow, and only [`crate::workflow`] produces the updates that move
//! a request from one variant to the next.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{DispatchLedger, RecordIds, RequestStatus, StatusHistory, StatusHistoryEntry};
use crate::error::WorkflowError;
use crate::types::{Actor, Importance, ResponsibleTeam};
use crate::validation;
use crate::workflow::RequestUpdate;

/// Part identity and commercial details
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PartInfo {
    pub part_number: String,
    pub part_name: String,
    /// Absent means "not entered", which is not the same as zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_supplier: Option<String>,
}

/// Three-state view of an optional price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceState {
    NotSet,
    Zero,
    Positive,
}

impl PartInfo {
    pub fn price_state(&self) -> PriceState {
        match self.price {
            None => PriceState::NotSet,
            Some(p) if p.is_zero() => PriceState::Zero,
            Some(_) => PriceState::Positive,
        }
    }
}

/// Demand from one branch, fixed at creation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BranchRequirement {
    #[validate(length(min = 1, message = "branch id is required"))]
    pub branch_id: String,
    #[validate(length(min = 1, message = "branch name is required"))]
    pub branch_name: String,
    pub requested_quantity: u32,
}

impl BranchRequirement {
    pub fn new(branch_id: impl Into<String>, branch_name: impl Into<String>, requested_quantity: u32) -> Self {
        Self {
            branch_id: branch_id.into(),
            branch_name: branch_name.into(),
            requested_quantity,
        }
    }
}

/// Three-level item group used for E-COUNT registration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ItemGroup {
    pub level1: String,
    pub level2: String,
    pub level3: String,
}

impl ItemGroup {
    pub fn new(level1: impl Into<String>, level2: impl Into<String>, level3: impl Into<String>) -> Self {
        Self {
            level1: level1.into(),
            level2: level2.into(),
            level3: level3.into(),
        }
    }
}

/// Membership of a request in a multi-part set. Immutable once assigned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SetMembership {
    pub set_id: String,
    pub set_name: String,
    pub part_order_in_set: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_group: Option<ItemGroup>,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrder {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_delivery_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_delivery_quantity: Option<u32>,
    /// Resolved supplier: the explicit actual supplier, else the initial one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,
    pub ordered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseReceipt {
    pub actual_receipt_date: NaiveDate,
    pub actual_received_quantity: u32,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    QuantityShortage,
    QualityDefect,
    DeliveryDelay,
    WrongItem,
    SupplierIssue,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourcingMethod {
    AlternativeSupplier,
    DirectPurchase,
    SubstitutePart,
    InternalTransfer,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogisticsIssue {
    pub issue_type: IssueType,
    pub description: String,
    pub urgency: UrgencyLevel,
    pub alternative_sourcing_required: bool,
    pub reported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourcingPlan {
    pub method: SourcingMethod,
    pub description: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Termination {
    pub reason: String,
    pub final_notes: String,
    pub terminated_at: DateTime<Utc>,
}

/// Purchase order placed, nothing received yet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Ordered {
    pub registration: Registration,
    pub order: PurchaseOrder,
}

/// Goods are in the warehouse
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Received {
    pub registration: Registration,
    pub order: PurchaseOrder,
    pub receipt: WarehouseReceipt,
}

/// At least one branch has been dispatched
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Dispatching {
    pub registration: Registration,
    pub order: PurchaseOrder,
    pub receipt: WarehouseReceipt,
    pub branch_dispatch_quantities: DispatchLedger,
    pub remaining_quantity: u32,
    pub dispatched_at: DateTime<Utc>,
}

/// Every branch confirmed what it received
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Confirmed {
    pub registration: Registration,
    pub order: PurchaseOrder,
    pub receipt: WarehouseReceipt,
    pub branch_dispatch_quantities: DispatchLedger,
    pub remaining_quantity: u32,
    pub confirmed_at: DateTime<Utc>,
}

/// Status-specific data of a request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Stage {
    OperationsSubmitted,
    EcountRegistered(Registration),
    PoCompleted(Ordered),
    WarehouseReceived(Received),
    PartialDispatched(Dispatching),
    BranchDispatched(Dispatching),
    BranchReceivedConfirmed(Confirmed),
    /// `prior` is the last regular stage, so progress data stays reachable
    #[serde(rename_all = "camelCase")]
    LogisticsIssueReported {
        prior: Box<Stage>,
        issue: LogisticsIssue,
    },
    #[serde(rename_all = "camelCase")]
    AlternativeSourcing {
        prior: Box<Stage>,
        issue: LogisticsIssue,
        sourcing: SourcingPlan,
    },
    #[serde(rename_all = "camelCase")]
    ProcessTerminated {
        prior: Box<Stage>,
        termination: Termination,
    },
}

impl Stage {
    pub fn status(&self) -> RequestStatus {
        match self {
            Stage::OperationsSubmitted => RequestStatus::OperationsSubmitted,
            Stage::EcountRegistered(_) => RequestStatus::EcountRegistered,
            Stage::PoCompleted(_) => RequestStatus::PoCompleted,
            Stage::WarehouseReceived(_) => RequestStatus::WarehouseReceived,
            Stage::PartialDispatched(_) => RequestStatus::PartialDispatched,
            Stage::BranchDispatched(_) => RequestStatus::BranchDispatched,
            Stage::BranchReceivedConfirmed(_) => RequestStatus::BranchReceivedConfirmed,
            Stage::LogisticsIssueReported { .. } => RequestStatus::LogisticsIssueReported,
            Stage::AlternativeSourcing { .. } => RequestStatus::AlternativeSourcing,
            Stage::ProcessTerminated { .. } => RequestStatus::ProcessTerminated,
        }
    }

    /// The last regular stage, looking through issue/sourcing/termination
    pub fn progress(&self) -> &Stage {
        match self {
            Stage::LogisticsIssueReported { prior, .. }
            | Stage::AlternativeSourcing { prior, .. }
            | Stage::ProcessTerminated { prior, .. } => prior.progress(),
            other => other,
        }
    }

    pub fn registration(&self) -> Option<&Registration> {
        match self.progress() {
            Stage::EcountRegistered(r) => Some(r),
            Stage::PoCompleted(s) => Some(&s.registration),
            Stage::WarehouseReceived(s) => Some(&s.registration),
            Stage::PartialDispatched(s) | Stage::BranchDispatched(s) => Some(&s.registration),
            Stage::BranchReceivedConfirmed(s) => Some(&s.registration),
            _ => None,
        }
    }

    pub fn order(&self) -> Option<&PurchaseOrder> {
        match self.progress() {
            Stage::PoCompleted(s) => Some(&s.order),
            Stage::WarehouseReceived(s) => Some(&s.order),
            Stage::PartialDispatched(s) | Stage::BranchDispatched(s) => Some(&s.order),
            Stage::BranchReceivedConfirmed(s) => Some(&s.order),
            _ => None,
        }
    }

    pub fn receipt(&self) -> Option<&WarehouseReceipt> {
        match self.progress() {
            Stage::WarehouseReceived(s) => Some(&s.receipt),
            Stage::PartialDispatched(s) | Stage::BranchDispatched(s) => Some(&s.receipt),
            Stage::BranchReceivedConfirmed(s) => Some(&s.receipt),
            _ => None,
        }
    }

    /// Committed dispatch rows; absent before dispatch begins
    pub fn ledger(&self) -> Option<&DispatchLedger> {
        match self.progress() {
            Stage::PartialDispatched(s) | Stage::BranchDispatched(s) => {
                Some(&s.branch_dispatch_quantities)
            }
            Stage::BranchReceivedConfirmed(s) => Some(&s.branch_dispatch_quantities),
            _ => None,
        }
    }

    pub fn remaining_quantity(&self) -> Option<u32> {
        match self.progress() {
            Stage::PartialDispatched(s) | Stage::BranchDispatched(s) => Some(s.remaining_quantity),
            Stage::BranchReceivedConfirmed(s) => Some(s.remaining_quantity),
            _ => None,
        }
    }

    pub fn issue(&self) -> Option<&LogisticsIssue> {
        match self {
            Stage::LogisticsIssueReported { issue, .. } | Stage::AlternativeSourcing { issue, .. } => {
                Some(issue)
            }
            Stage::ProcessTerminated { prior, .. } => prior.issue(),
            _ => None,
        }
    }

    pub fn termination(&self) -> Option<&Termination> {
        match self {
            Stage::ProcessTerminated { termination, .. } => Some(termination),
            _ => None,
        }
    }
}

/// Input for submitting a new request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequestInput {
    #[validate(length(min = 1, max = 64, message = "part number is required"))]
    pub part_number: String,
    #[validate(length(min = 1, max = 200, message = "part name is required"))]
    pub part_name: String,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    #[validate(length(equal = 3, message = "currency must be a 3-letter code"))]
    pub currency: Option<String>,
    #[serde(default)]
    pub initial_supplier: Option<String>,
    #[serde(default)]
    pub importance: Importance,
    #[validate(length(min = 1, message = "at least one branch requirement is required"))]
    pub branch_requirements: Vec<BranchRequirement>,
    #[serde(default)]
    pub logistics_stock_quantity: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CreateRequestInput {
    /// Branch quantities plus logistics stock; `None` when it overflows
    fn total_requested(&self) -> Option<u32> {
        self.branch_requirements
            .iter()
            .map(|r| r.requested_quantity)
            .try_fold(self.logistics_stock_quantity, u32::checked_add)
    }

    /// Field checks shared by single, batch and set creation.
    /// `prefix` scopes field names, e.g. `parts[2]`.
    pub fn check(&self, prefix: &str) -> Result<(), WorkflowError> {
        let scoped = |field: &str| {
            if prefix.is_empty() {
                field.to_string()
            } else {
                format!("{}.{}", prefix, field)
            }
        };

        self.validate()
            .map_err(|errors| validation::first_violation(&errors, prefix))?;
        if self.part_number.trim().is_empty() {
            return Err(WorkflowError::validation(scoped("partNumber"), "part number is required"));
        }
        if self.part_name.trim().is_empty() {
            return Err(WorkflowError::validation(scoped("partName"), "part name is required"));
        }
        validation::validate_price(self.price)
            .map_err(|m| WorkflowError::validation(scoped("price"), m))?;
        if let Some(currency) = &self.currency {
            validation::validate_currency_code(currency)
                .map_err(|m| WorkflowError::validation(scoped("currency"), m))?;
        }
        for (i, requirement) in self.branch_requirements.iter().enumerate() {
            let row = scoped(&format!("branchRequirements[{}]", i));
            requirement
                .validate()
                .map_err(|errors| validation::first_violation(&errors, &row))?;
        }
        validation::validate_unique_branches(&self.branch_requirements)
            .map_err(|m| WorkflowError::validation(scoped("branchRequirements"), m))?;
        if self.total_requested().is_none() {
            return Err(WorkflowError::validation(
                scoped("branchRequirements"),
                "total requested quantity is too large",
            ));
        }
        Ok(())
    }
}

/// The central entity tracked through the workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub id: Uuid,
    pub request_id: String,
    pub part: PartInfo,
    pub importance: Importance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    branch_requirements: Vec<BranchRequirement>,
    logistics_stock_quantity: u32,
    total_requested_quantity: u32,
    requested_by: Actor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    set: Option<SetMembership>,
    stage: Stage,
    current_responsible_team: ResponsibleTeam,
    status_history: StatusHistory,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseRequest {
    /// Submit a new request in `operations_submitted`.
    ///
    /// The total requested quantity is computed here and never again.
    pub fn submit(
        input: &CreateRequestInput,
        ids: RecordIds,
        set: Option<SetMembership>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Self, WorkflowError> {
        input.check("")?;
        validation::validate_actor(actor).map_err(|m| WorkflowError::validation("actor", m))?;

        let total_requested_quantity = input.total_requested().ok_or_else(|| {
            WorkflowError::validation("branchRequirements", "total requested quantity is too large")
        })?;

        let comments = match &set {
            Some(m) => format!("Request submitted as part {} of set {}", m.part_order_in_set, m.set_name),
            None => "Request submitted".to_string(),
        };
        let entry = StatusHistoryEntry::new(RequestStatus::OperationsSubmitted, actor, now, comments);

        Ok(Self {
            id: ids.id,
            request_id: ids.request_id,
            part: PartInfo {
                part_number: input.part_number.trim().to_string(),
                part_name: input.part_name.trim().to_string(),
                price: input.price,
                currency: input.currency.clone(),
                initial_supplier: validation::non_blank(input.initial_supplier.as_deref()),
            },
            importance: input.importance,
            notes: input.notes.clone(),
            branch_requirements: input.branch_requirements.clone(),
            logistics_stock_quantity: input.logistics_stock_quantity,
            total_requested_quantity,
            requested_by: actor.clone(),
            set,
            stage: Stage::OperationsSubmitted,
            current_responsible_team: ResponsibleTeam::Operations,
            status_history: StatusHistory::starting_with(entry),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn status(&self) -> RequestStatus {
        self.stage.status()
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn responsible_team(&self) -> ResponsibleTeam {
        self.current_responsible_team
    }

    pub fn history(&self) -> &StatusHistory {
        &self.status_history
    }

    pub fn branch_requirements(&self) -> &[BranchRequirement] {
        &self.branch_requirements
    }

    pub fn logistics_stock_quantity(&self) -> u32 {
        self.logistics_stock_quantity
    }

    pub fn total_requested_quantity(&self) -> u32 {
        self.total_requested_quantity
    }

    pub fn requested_by(&self) -> &Actor {
        &self.requested_by
    }

    pub fn set_membership(&self) -> Option<&SetMembership> {
        self.set.as_ref()
    }

    pub fn is_part_of_set(&self) -> bool {
        self.set.is_some()
    }

    pub fn actual_received_quantity(&self) -> Option<u32> {
        self.stage.receipt().map(|r| r.actual_received_quantity)
    }

    /// Optimistic-concurrency token. Every accepted transition appends one
    /// history entry, so the history length changes even when the status
    /// does not.
    pub fn version(&self) -> u64 {
        self.status_history.len() as u64
    }

    pub fn ledger(&self) -> Option<&DispatchLedger> {
        self.stage.ledger()
    }

    /// Draft ledger for a dispatch form, keeping committed progress
    pub fn dispatch_draft(&self) -> DispatchLedger {
        DispatchLedger::initialize(&self.branch_requirements, self.ledger())
    }

    /// Apply an update produced by the workflow.
    ///
    /// Fails with `StateMismatch` when the request moved on since the update
    /// was computed, including transitions that kept the same status. A
    /// retried commit is therefore a no-op.
    pub fn apply_update(&mut self, update: &RequestUpdate) -> Result<(), WorkflowError> {
        if update.id() != self.id
            || update.from() != self.status()
            || update.version() != self.version()
        {
            return Err(WorkflowError::StateMismatch {
                request_id: self.request_id.clone(),
                expected: vec![update.from()],
                actual: self.status(),
            });
        }
        self.stage = update.stage().clone();
        self.current_responsible_team = update.responsible_team();
        self.status_history.append(update.entry().clone());
        self.updated_at = update.entry().updated_at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn input() -> CreateRequestInput {
        CreateRequestInput {
            part_number: "BRK-1002".into(),
            part_name: "Brake pad".into(),
            price: None,
            currency: None,
            initial_supplier: Some("Hanil Parts".into()),
            importance: Importance::High,
            branch_requirements: vec![
                BranchRequirement::new("b-gangnam", "강남점", 60),
                BranchRequirement::new("b-bundang", "분당점", 50),
            ],
            logistics_stock_quantity: 10,
            notes: None,
        }
    }

    fn ids() -> RecordIds {
        RecordIds {
            id: Uuid::nil(),
            request_id: "REQ-20240301090000000-AAAAAA".into(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_submit_computes_total_once() {
        let actor = Actor::new("u1", "Kim");
        let request = PurchaseRequest::submit(&input(), ids(), None, &actor, now()).unwrap();

        assert_eq!(request.total_requested_quantity(), 120);
        assert_eq!(request.status(), RequestStatus::OperationsSubmitted);
        assert_eq!(request.responsible_team(), ResponsibleTeam::Operations);
        assert_eq!(request.history().len(), 1);
        assert!(!request.is_part_of_set());
        assert!(request.ledger().is_none());
    }

    #[test]
    fn test_submit_rejects_total_beyond_u32() {
        let actor = Actor::new("u1", "Kim");
        let mut huge = input();
        huge.branch_requirements = vec![
            BranchRequirement::new("b-gangnam", "강남점", u32::MAX),
            BranchRequirement::new("b-bundang", "분당점", 1),
        ];
        huge.logistics_stock_quantity = 0;
        let err = PurchaseRequest::submit(&huge, ids(), None, &actor, now()).unwrap_err();
        assert_eq!(err.field(), Some("branchRequirements"));

        // Logistics stock counts toward the same total
        huge.branch_requirements = vec![BranchRequirement::new("b-gangnam", "강남점", u32::MAX)];
        huge.logistics_stock_quantity = 1;
        let err = PurchaseRequest::submit(&huge, ids(), None, &actor, now()).unwrap_err();
        assert_eq!(err.field(), Some("branchRequirements"));

        huge.logistics_stock_quantity = 0;
        let request = PurchaseRequest::submit(&huge, ids(), None, &actor, now()).unwrap();
        assert_eq!(request.total_requested_quantity(), u32::MAX);
    }

    #[test]
    fn test_submit_rejects_missing_part_name() {
        let mut bad = input();
        bad.part_name = "  ".into();
        let err = PurchaseRequest::submit(&bad, ids(), None, &Actor::new("u1", "Kim"), now())
            .unwrap_err();
        assert_eq!(err.field(), Some("partName"));
    }

    #[test]
    fn test_submit_rejects_duplicate_branches() {
        let mut bad = input();
        bad.branch_requirements.push(BranchRequirement::new("b-gangnam", "강남점", 5));
        let err = PurchaseRequest::submit(&bad, ids(), None, &Actor::new("u1", "Kim"), now())
            .unwrap_err();
        assert_eq!(err.field(), Some("branchRequirements"));
    }

    #[test]
    fn test_price_three_states_survive_json() {
        let actor = Actor::new("u1", "Kim");
        let mut with_zero = input();
        with_zero.price = Some(Decimal::ZERO);

        let unset = PurchaseRequest::submit(&input(), ids(), None, &actor, now()).unwrap();
        let zero = PurchaseRequest::submit(&with_zero, ids(), None, &actor, now()).unwrap();

        let unset_json = serde_json::to_value(&unset).unwrap();
        let zero_json = serde_json::to_value(&zero).unwrap();
        assert!(unset_json["part"].get("price").is_none());
        assert!(zero_json["part"].get("price").is_some());

        let back: PurchaseRequest = serde_json::from_value(zero_json).unwrap();
        assert_eq!(back.part.price_state(), PriceState::Zero);
        assert_eq!(unset.part.price_state(), PriceState::NotSet);
    }

    #[test]
    fn test_stage_serializes_with_status_tag() {
        let request =
            PurchaseRequest::submit(&input(), ids(), None, &Actor::new("u1", "Kim"), now()).unwrap();
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stage"]["status"], "operations_submitted");
        assert_eq!(json["currentResponsibleTeam"], "operations");
        assert_eq!(json["totalRequestedQuantity"], 120);
    }
}
