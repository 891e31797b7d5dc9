//! Fixtures shared by the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use parts_fulfillment_backend::gateway::{InMemoryGateway, PersistenceGateway};
use parts_fulfillment_backend::services::{
    BulkTransitionService, FixedClock, SequentialIds, SetService, WorkflowService,
};
use shared::{
    Actor, BranchRequirement, CreateRequestInput, DispatchInput, Importance, ItemGroup,
    PurchaseOrderInput, PurchaseRequest, ReceiptInput, Transition, TransitionInput,
};

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
}

pub fn operations() -> Actor {
    Actor::new("u-ops", "Kim").with_role("operations")
}

pub fn logistics() -> Actor {
    Actor::new("u-logi", "Park").with_role("logistics")
}

pub struct Harness {
    pub gateway: InMemoryGateway,
    pub clock: Arc<FixedClock>,
    pub workflow: WorkflowService,
    pub bulk: BulkTransitionService,
    pub sets: SetService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_gateway(InMemoryGateway::new(), true)
    }

    pub fn non_atomic() -> Self {
        Self::with_gateway(InMemoryGateway::non_atomic(), false)
    }

    fn with_gateway(gateway: InMemoryGateway, atomic_batches: bool) -> Self {
        let clock = Arc::new(FixedClock::new(start()));
        let ids = Arc::new(SequentialIds::new());
        let shared_gateway: Arc<dyn PersistenceGateway> = Arc::new(gateway.clone());
        Self {
            workflow: WorkflowService::new(shared_gateway.clone(), clock.clone(), ids.clone()),
            bulk: BulkTransitionService::new(shared_gateway.clone(), clock.clone(), 200, atomic_batches),
            sets: SetService::new(shared_gateway, clock.clone(), ids),
            gateway,
            clock,
        }
    }

    pub fn tick(&self) {
        self.clock.advance(chrono::Duration::minutes(1));
    }

    pub async fn submit(&self, input: CreateRequestInput) -> PurchaseRequest {
        self.workflow.create_request(input, &operations()).await.unwrap()
    }

    pub async fn step(&self, request: &PurchaseRequest, input: TransitionInput) -> PurchaseRequest {
        self.tick();
        self.workflow
            .transition(request.id, &Transition::new(input), &logistics())
            .await
            .unwrap()
    }

    /// Submit and move a request to `warehouse_received`
    pub async fn received(&self, input: CreateRequestInput, quantity: u32) -> PurchaseRequest {
        let request = self.submit(input).await;
        let request = self.step(&request, order()).await;
        self.step(&request, receipt(quantity)).await
    }
}

pub fn part(number: &str, branches: &[(&str, &str, u32)]) -> CreateRequestInput {
    CreateRequestInput {
        part_number: number.to_string(),
        part_name: format!("Part {}", number),
        price: None,
        currency: None,
        initial_supplier: Some("Hanil Parts".into()),
        importance: Importance::High,
        branch_requirements: branches
            .iter()
            .map(|(id, name, quantity)| BranchRequirement::new(*id, *name, *quantity))
            .collect(),
        logistics_stock_quantity: 0,
        notes: None,
    }
}

/// Two branches: A wants 60, B wants 50
pub fn two_branch_part(number: &str) -> CreateRequestInput {
    part(number, &[("b-a", "Branch A", 60), ("b-b", "Branch B", 50)])
}

pub fn order() -> TransitionInput {
    TransitionInput::CompletePurchaseOrder(PurchaseOrderInput {
        item_group: Some(ItemGroup::new("Brakes", "Disc", "Pads")),
        expected_delivery_date: NaiveDate::from_ymd_opt(2024, 3, 10),
        expected_delivery_quantity: Some(110),
        actual_supplier: None,
    })
}

pub fn receipt(quantity: u32) -> TransitionInput {
    TransitionInput::ReceiveAtWarehouse(ReceiptInput {
        actual_receipt_date: NaiveDate::from_ymd_opt(2024, 3, 9),
        actual_received_quantity: Some(quantity),
    })
}

/// Dispatch the given branches with the given quantities, keeping committed rows
pub fn dispatch(request: &PurchaseRequest, rows: &[(&str, u32)]) -> TransitionInput {
    let mut ledger = request.dispatch_draft();
    for (branch, quantity) in rows {
        ledger.set_quantity(branch, *quantity).unwrap();
        ledger.set_dispatched(branch, true).unwrap();
    }
    TransitionInput::DispatchToBranches(DispatchInput {
        branch_dispatch_quantities: ledger,
    })
}
