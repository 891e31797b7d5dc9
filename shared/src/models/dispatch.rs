//! Branch dispatch ledger
//!
//! One row per branch per request. The ledger is edited freely while a
//! dispatch form is open; the conservation check (dispatched total never
//! above the warehouse-received quantity) runs once, when the dispatch is
//! committed through the workflow.

use serde::{Deserialize, Serialize};

use super::BranchRequirement;
use crate::error::WorkflowError;

/// One branch's slice of a request's dispatch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BranchDispatchInfo {
    pub branch_id: String,
    /// Snapshot taken when the dispatch was planned
    pub branch_name: String,
    pub required_quantity: u32,
    pub dispatched_quantity: u32,
    pub is_dispatched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_dispatched_quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_receipt_memo: Option<String>,
}

impl BranchDispatchInfo {
    fn seeded(requirement: &BranchRequirement) -> Self {
        Self {
            branch_id: requirement.branch_id.clone(),
            branch_name: requirement.branch_name.clone(),
            required_quantity: requirement.requested_quantity,
            dispatched_quantity: requirement.requested_quantity,
            is_dispatched: false,
            actual_dispatched_quantity: None,
            confirmed_quantity: None,
            branch_receipt_memo: None,
        }
    }

    /// Quantity that physically left the warehouse
    pub fn shipped_quantity(&self) -> u32 {
        self.actual_dispatched_quantity.unwrap_or(self.dispatched_quantity)
    }
}

/// Per-branch dispatch rows for one request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct DispatchLedger {
    rows: Vec<BranchDispatchInfo>,
}

impl DispatchLedger {
    /// Seed rows from the branch requirements.
    ///
    /// When re-entering an in-progress dispatch, the planned quantity and the
    /// dispatch flag already recorded for a branch are kept.
    pub fn initialize(requirements: &[BranchRequirement], existing: Option<&DispatchLedger>) -> Self {
        let rows = requirements
            .iter()
            .map(|requirement| {
                let mut row = BranchDispatchInfo::seeded(requirement);
                if let Some(prior) = existing.and_then(|l| l.row(&requirement.branch_id)) {
                    row.dispatched_quantity = prior.dispatched_quantity;
                    row.is_dispatched = prior.is_dispatched;
                    row.actual_dispatched_quantity = prior.actual_dispatched_quantity;
                }
                row
            })
            .collect();
        Self { rows }
    }

    pub fn from_rows(rows: Vec<BranchDispatchInfo>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[BranchDispatchInfo] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, branch_id: &str) -> Option<&BranchDispatchInfo> {
        self.rows.iter().find(|r| r.branch_id == branch_id)
    }

    fn row_mut(&mut self, branch_id: &str) -> Result<&mut BranchDispatchInfo, WorkflowError> {
        self.rows
            .iter_mut()
            .find(|r| r.branch_id == branch_id)
            .ok_or_else(|| {
                WorkflowError::validation(
                    "branchId",
                    format!("branch {} is not part of this request", branch_id),
                )
            })
    }

    /// Toggle one branch. Capacity is not checked here.
    pub fn set_dispatched(&mut self, branch_id: &str, dispatched: bool) -> Result<(), WorkflowError> {
        self.row_mut(branch_id)?.is_dispatched = dispatched;
        Ok(())
    }

    /// Change the planned outbound quantity for one branch
    pub fn set_quantity(&mut self, branch_id: &str, quantity: u32) -> Result<(), WorkflowError> {
        self.row_mut(branch_id)?.dispatched_quantity = quantity;
        Ok(())
    }

    pub fn set_actual_dispatched(
        &mut self,
        branch_id: &str,
        quantity: Option<u32>,
    ) -> Result<(), WorkflowError> {
        self.row_mut(branch_id)?.actual_dispatched_quantity = quantity;
        Ok(())
    }

    /// Quick action: take back a toggle before commit and restore the
    /// planned quantity to what the branch asked for
    pub fn undo(&mut self, branch_id: &str) -> Result<(), WorkflowError> {
        let row = self.row_mut(branch_id)?;
        row.is_dispatched = false;
        row.dispatched_quantity = row.required_quantity;
        row.actual_dispatched_quantity = None;
        Ok(())
    }

    pub fn dispatch_all(&mut self) {
        for row in &mut self.rows {
            row.is_dispatched = true;
        }
    }

    /// Untoggle every row that was not dispatched in `committed`
    pub fn clear_uncommitted(&mut self, committed: Option<&DispatchLedger>) {
        for row in &mut self.rows {
            let was_committed = committed
                .and_then(|c| c.row(&row.branch_id))
                .map(|c| c.is_dispatched)
                .unwrap_or(false);
            if !was_committed {
                row.is_dispatched = false;
            }
        }
    }

    /// Sum of planned quantities over dispatched rows, widened so that
    /// rows near `u32::MAX` cannot wrap
    pub fn total_planned(&self) -> u64 {
        self.rows
            .iter()
            .filter(|r| r.is_dispatched)
            .map(|r| u64::from(r.dispatched_quantity))
            .sum()
    }

    /// What is left of `received` after the dispatched rows; negative when
    /// the plan is over capacity
    pub fn margin(&self, received: u32) -> i64 {
        i64::from(received).saturating_sub_unsigned(self.total_planned())
    }

    /// Conservation check; returns the remaining quantity when it holds
    pub fn check_capacity(&self, received: u32) -> Result<u32, WorkflowError> {
        let requested = self.total_planned();
        match u32::try_from(requested) {
            Ok(planned) if planned <= received => Ok(received - planned),
            _ => Err(WorkflowError::CapacityExceeded {
                requested,
                available: received,
            }),
        }
    }

    pub fn any_dispatched(&self) -> bool {
        self.rows.iter().any(|r| r.is_dispatched)
    }

    pub fn is_fully_dispatched(&self) -> bool {
        !self.rows.is_empty() && self.rows.iter().all(|r| r.is_dispatched)
    }

    pub fn pending_branches(&self) -> impl Iterator<Item = &BranchDispatchInfo> {
        self.rows.iter().filter(|r| !r.is_dispatched)
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [BranchDispatchInfo] {
        &mut self.rows
    }
}

/// True iff every request that has a row for `branch_name` has it dispatched.
///
/// Requests without that branch are ignored; when no request has the branch
/// at all the answer is false.
pub fn is_branch_fully_dispatched_across<'a, I>(ledgers: I, branch_name: &str) -> bool
where
    I: IntoIterator<Item = &'a DispatchLedger>,
{
    let mut seen = false;
    for ledger in ledgers {
        for row in ledger.rows.iter().filter(|r| r.branch_name == branch_name) {
            if !row.is_dispatched {
                return false;
            }
            seen = true;
        }
    }
    seen
}
