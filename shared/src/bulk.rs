//! Bulk transitions over requests that share one status
//!
//! A [`BulkForm`] is opened over a selection of requests, edited (broadcast
//! values, per-request overrides, per-branch toggles) and then planned
//! against freshly read requests. Planning is all-or-nothing: either every
//! entry yields an update or the first failing entry is reported.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::models::{
    is_branch_fully_dispatched_across, DispatchLedger, ItemGroup, PurchaseRequest, RequestStatus,
};
use crate::types::Actor;
use crate::validation;
use crate::workflow::{
    apply, DispatchInput, PurchaseOrderInput, ReceiptInput, RequestUpdate, Transition,
    TransitionInput,
};

/// Which transition a bulk form applies, derived from the shared status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BulkProcess {
    RegistrationAndOrder,
    WarehouseReceipt,
    BranchDispatch,
}

impl BulkProcess {
    pub fn for_status(status: RequestStatus) -> Result<Self, WorkflowError> {
        match status {
            RequestStatus::OperationsSubmitted | RequestStatus::EcountRegistered => {
                Ok(BulkProcess::RegistrationAndOrder)
            }
            RequestStatus::PoCompleted => Ok(BulkProcess::WarehouseReceipt),
            RequestStatus::WarehouseReceived | RequestStatus::PartialDispatched => {
                Ok(BulkProcess::BranchDispatch)
            }
            other => Err(WorkflowError::UnsupportedBulkStatus { status: other }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BulkProcess::RegistrationAndOrder => "registration_and_order",
            BulkProcess::WarehouseReceipt => "warehouse_receipt",
            BulkProcess::BranchDispatch => "branch_dispatch",
        }
    }

    fn accepts(&self, input: &TransitionInput) -> bool {
        matches!(
            (self, input),
            (BulkProcess::RegistrationAndOrder, TransitionInput::CompletePurchaseOrder(_))
                | (BulkProcess::WarehouseReceipt, TransitionInput::ReceiveAtWarehouse(_))
                | (BulkProcess::BranchDispatch, TransitionInput::DispatchToBranches(_))
        )
    }

    fn default_input(&self, request: &PurchaseRequest) -> TransitionInput {
        match self {
            BulkProcess::RegistrationAndOrder => {
                TransitionInput::CompletePurchaseOrder(PurchaseOrderInput {
                    item_group: request
                        .stage()
                        .registration()
                        .and_then(|r| r.item_group.clone()),
                    ..Default::default()
                })
            }
            BulkProcess::WarehouseReceipt => {
                TransitionInput::ReceiveAtWarehouse(ReceiptInput::default())
            }
            BulkProcess::BranchDispatch => TransitionInput::DispatchToBranches(DispatchInput {
                branch_dispatch_quantities: request.dispatch_draft(),
            }),
        }
    }
}

/// Per-request input record inside a bulk form
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BulkEntry {
    pub id: Uuid,
    pub request_id: String,
    pub input: TransitionInput,
}

/// Editable bulk form over requests in one status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BulkForm {
    status: RequestStatus,
    process: BulkProcess,
    entries: Vec<BulkEntry>,
    #[serde(default)]
    pub comments: Option<String>,
}

/// Validated updates ready to be committed as one batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BulkPlan {
    pub process: BulkProcess,
    pub updates: Vec<RequestUpdate>,
    pub summary: String,
}

/// Distinct statuses in first-seen order
fn distinct_statuses(requests: &[PurchaseRequest]) -> Vec<RequestStatus> {
    let mut statuses = Vec::new();
    for request in requests {
        let status = request.status();
        if !statuses.contains(&status) {
            statuses.push(status);
        }
    }
    statuses
}

impl BulkForm {
    /// Open a form. The shared-status check runs before anything else.
    pub fn new(requests: &[PurchaseRequest]) -> Result<Self, WorkflowError> {
        let statuses = distinct_statuses(requests);
        let status = match statuses.as_slice() {
            [] => return Err(WorkflowError::EmptyBatch),
            [single] => *single,
            _ => return Err(WorkflowError::MixedState { statuses }),
        };
        let process = BulkProcess::for_status(status)?;

        let entries = requests
            .iter()
            .map(|request| BulkEntry {
                id: request.id,
                request_id: request.request_id.clone(),
                input: process.default_input(request),
            })
            .collect();

        Ok(Self {
            status,
            process,
            entries,
            comments: None,
        })
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn process(&self) -> BulkProcess {
        self.process
    }

    pub fn entries(&self) -> &[BulkEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn request_ids(&self) -> Vec<Uuid> {
        self.entries.iter().map(|e| e.id).collect()
    }

    pub fn entry(&self, id: Uuid) -> Option<&BulkEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    fn wrong_process(&self, action: &str) -> WorkflowError {
        WorkflowError::validation(
            "process",
            format!("{} does not apply to a {} form", action, self.process.as_str()),
        )
    }

    fn orders_mut(&mut self, action: &str) -> Result<Vec<&mut PurchaseOrderInput>, WorkflowError> {
        if self.process != BulkProcess::RegistrationAndOrder {
            return Err(self.wrong_process(action));
        }
        Ok(self
            .entries
            .iter_mut()
            .filter_map(|e| match &mut e.input {
                TransitionInput::CompletePurchaseOrder(order) => Some(order),
                _ => None,
            })
            .collect())
    }

    fn receipts_mut(&mut self, action: &str) -> Result<Vec<&mut ReceiptInput>, WorkflowError> {
        if self.process != BulkProcess::WarehouseReceipt {
            return Err(self.wrong_process(action));
        }
        Ok(self
            .entries
            .iter_mut()
            .filter_map(|e| match &mut e.input {
                TransitionInput::ReceiveAtWarehouse(receipt) => Some(receipt),
                _ => None,
            })
            .collect())
    }

    fn ledgers_mut(&mut self, action: &str) -> Result<Vec<&mut DispatchLedger>, WorkflowError> {
        if self.process != BulkProcess::BranchDispatch {
            return Err(self.wrong_process(action));
        }
        Ok(self
            .entries
            .iter_mut()
            .filter_map(|e| match &mut e.input {
                TransitionInput::DispatchToBranches(d) => Some(&mut d.branch_dispatch_quantities),
                _ => None,
            })
            .collect())
    }

    pub fn broadcast_item_group(&mut self, group: &ItemGroup) -> Result<(), WorkflowError> {
        for order in self.orders_mut("item group")? {
            order.item_group = Some(group.clone());
        }
        Ok(())
    }

    pub fn broadcast_expected_delivery(
        &mut self,
        date: NaiveDate,
        quantity: Option<u32>,
    ) -> Result<(), WorkflowError> {
        for order in self.orders_mut("expected delivery")? {
            order.expected_delivery_date = Some(date);
            if quantity.is_some() {
                order.expected_delivery_quantity = quantity;
            }
        }
        Ok(())
    }

    pub fn broadcast_supplier(&mut self, supplier: &str) -> Result<(), WorkflowError> {
        let supplier = validation::non_blank(Some(supplier));
        for order in self.orders_mut("supplier")? {
            order.actual_supplier = supplier.clone();
        }
        Ok(())
    }

    pub fn broadcast_receipt_date(&mut self, date: NaiveDate) -> Result<(), WorkflowError> {
        for receipt in self.receipts_mut("receipt date")? {
            receipt.actual_receipt_date = Some(date);
        }
        Ok(())
    }

    /// Toggle one branch on every request that has it. Requests without the
    /// branch are left alone.
    pub fn toggle_branch(&mut self, branch_name: &str, dispatched: bool) -> Result<(), WorkflowError> {
        for ledger in self.ledgers_mut("branch toggle")? {
            let ids: Vec<String> = ledger
                .rows()
                .iter()
                .filter(|r| r.branch_name == branch_name)
                .map(|r| r.branch_id.clone())
                .collect();
            for id in ids {
                ledger.set_dispatched(&id, dispatched)?;
            }
        }
        Ok(())
    }

    /// Whether every request having `branch_name` has it toggled on
    pub fn is_branch_fully_dispatched(&self, branch_name: &str) -> bool {
        let ledgers = self.entries.iter().filter_map(|e| match &e.input {
            TransitionInput::DispatchToBranches(d) => Some(&d.branch_dispatch_quantities),
            _ => None,
        });
        is_branch_fully_dispatched_across(ledgers, branch_name)
    }

    /// Replace one request's input. The transition kind must match the form.
    pub fn override_input(&mut self, id: Uuid, input: TransitionInput) -> Result<(), WorkflowError> {
        if !self.process.accepts(&input) {
            return Err(self.wrong_process(input.name()));
        }
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| WorkflowError::validation("requestIds", format!("{} is not in this form", id)))?;
        entry.input = input;
        Ok(())
    }

    /// Validate every entry against `fresh` (the same requests, re-read
    /// just before commit) and build one update per request.
    pub fn plan(
        &self,
        fresh: &[PurchaseRequest],
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<BulkPlan, WorkflowError> {
        if self.entries.is_empty() || fresh.is_empty() {
            return Err(WorkflowError::EmptyBatch);
        }

        let statuses = distinct_statuses(fresh);
        if statuses.len() > 1 {
            return Err(WorkflowError::MixedState { statuses });
        }
        if let Some(moved) = fresh.iter().find(|r| r.status() != self.status) {
            return Err(WorkflowError::StateMismatch {
                request_id: moved.request_id.clone(),
                expected: vec![self.status],
                actual: moved.status(),
            });
        }

        let mut pairs = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let request = fresh.iter().find(|r| r.id == entry.id).ok_or_else(|| {
                WorkflowError::validation("requestIds", format!("{} was not loaded", entry.request_id))
            })?;
            if !self.process.accepts(&entry.input) {
                return Err(WorkflowError::validation(
                    "input",
                    format!("{} does not apply to a {} form", entry.input.name(), self.process.as_str()),
                )
                .for_item(&entry.request_id));
            }
            pairs.push((request, entry));
        }

        let summary = validation::non_blank(self.comments.as_deref())
            .unwrap_or_else(|| self.summarize(&pairs));

        let mut updates = Vec::with_capacity(pairs.len());
        for (request, entry) in pairs {
            let transition = Transition {
                input: entry.input.clone(),
                comments: Some(summary.clone()),
            };
            let update = apply(request, &transition, actor, now)
                .map_err(|e| e.for_item(&entry.request_id))?;
            updates.push(update);
        }

        Ok(BulkPlan {
            process: self.process,
            updates,
            summary,
        })
    }

    fn summarize(&self, pairs: &[(&PurchaseRequest, &BulkEntry)]) -> String {
        let count = pairs.len();
        match self.process {
            BulkProcess::RegistrationAndOrder => {
                format!("Bulk purchase order completed for {} requests", count)
            }
            BulkProcess::WarehouseReceipt => {
                let units: u64 = pairs
                    .iter()
                    .filter_map(|(_, e)| match &e.input {
                        TransitionInput::ReceiveAtWarehouse(r) => r.actual_received_quantity,
                        _ => None,
                    })
                    .map(u64::from)
                    .sum();
                format!("Bulk warehouse receipt for {} requests ({} units)", count, units)
            }
            BulkProcess::BranchDispatch => {
                // Per-branch totals of rows dispatched in this batch only
                let mut totals: Vec<(String, u64)> = Vec::new();
                for (request, entry) in pairs {
                    let TransitionInput::DispatchToBranches(d) = &entry.input else {
                        continue;
                    };
                    let committed = request.ledger();
                    for row in d.branch_dispatch_quantities.rows().iter().filter(|r| r.is_dispatched) {
                        let already = committed
                            .and_then(|c| c.row(&row.branch_id))
                            .map(|c| c.is_dispatched)
                            .unwrap_or(false);
                        if already {
                            continue;
                        }
                        match totals.iter_mut().find(|(name, _)| *name == row.branch_name) {
                            Some((_, total)) => *total += u64::from(row.dispatched_quantity),
                            None => totals.push((row.branch_name.clone(), u64::from(row.dispatched_quantity))),
                        }
                    }
                }
                let branches: Vec<String> = totals
                    .iter()
                    .map(|(name, total)| format!("{} {}", name, total))
                    .collect();
                format!("Bulk dispatch for {} requests: {}", count, branches.join(", "))
            }
        }
    }
}
