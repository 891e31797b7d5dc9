//! Request lifecycle status

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::types::Language;

/// Current status of a purchase request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    OperationsSubmitted,
    EcountRegistered,
    PoCompleted,
    WarehouseReceived,
    PartialDispatched,
    BranchDispatched,
    BranchReceivedConfirmed,
    LogisticsIssueReported,
    AlternativeSourcing,
    ProcessTerminated,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 10] = [
        RequestStatus::OperationsSubmitted,
        RequestStatus::EcountRegistered,
        RequestStatus::PoCompleted,
        RequestStatus::WarehouseReceived,
        RequestStatus::PartialDispatched,
        RequestStatus::BranchDispatched,
        RequestStatus::BranchReceivedConfirmed,
        RequestStatus::LogisticsIssueReported,
        RequestStatus::AlternativeSourcing,
        RequestStatus::ProcessTerminated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::OperationsSubmitted => "operations_submitted",
            RequestStatus::EcountRegistered => "ecount_registered",
            RequestStatus::PoCompleted => "po_completed",
            RequestStatus::WarehouseReceived => "warehouse_received",
            RequestStatus::PartialDispatched => "partial_dispatched",
            RequestStatus::BranchDispatched => "branch_dispatched",
            RequestStatus::BranchReceivedConfirmed => "branch_received_confirmed",
            RequestStatus::LogisticsIssueReported => "logistics_issue_reported",
            RequestStatus::AlternativeSourcing => "alternative_sourcing",
            RequestStatus::ProcessTerminated => "process_terminated",
        }
    }

    /// Terminal statuses accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::BranchReceivedConfirmed | RequestStatus::ProcessTerminated
        )
    }

    /// Side-branch statuses reached when something goes wrong in logistics
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            RequestStatus::LogisticsIssueReported | RequestStatus::AlternativeSourcing
        )
    }

    /// Every status that is not terminal
    pub fn non_terminal() -> Vec<RequestStatus> {
        Self::ALL.into_iter().filter(|s| !s.is_terminal()).collect()
    }

    pub fn label(&self, language: Language) -> &'static str {
        match language {
            Language::English => match self {
                RequestStatus::OperationsSubmitted => "Submitted by operations",
                RequestStatus::EcountRegistered => "Registered in E-COUNT",
                RequestStatus::PoCompleted => "Purchase order completed",
                RequestStatus::WarehouseReceived => "Received at warehouse",
                RequestStatus::PartialDispatched => "Partially dispatched",
                RequestStatus::BranchDispatched => "Dispatched to branches",
                RequestStatus::BranchReceivedConfirmed => "Branch receipt confirmed",
                RequestStatus::LogisticsIssueReported => "Logistics issue reported",
                RequestStatus::AlternativeSourcing => "Alternative sourcing",
                RequestStatus::ProcessTerminated => "Process terminated",
            },
            Language::Korean => match self {
                RequestStatus::OperationsSubmitted => "운영팀 요청",
                RequestStatus::EcountRegistered => "이카운트 등록",
                RequestStatus::PoCompleted => "발주 완료",
                RequestStatus::WarehouseReceived => "물류 입고",
                RequestStatus::PartialDispatched => "부분 출고",
                RequestStatus::BranchDispatched => "지점 출고",
                RequestStatus::BranchReceivedConfirmed => "지점 입고 확인",
                RequestStatus::LogisticsIssueReported => "물류 이슈 보고",
                RequestStatus::AlternativeSourcing => "대체 조달",
                RequestStatus::ProcessTerminated => "프로세스 종료",
            },
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| WorkflowError::validation("status", format!("unknown status '{}'", s)))
    }
}
