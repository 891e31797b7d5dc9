//! Single-request workflow service

use std::sync::Arc;

use shared::{
    apply, Actor, CreateRequestInput, PurchaseRequest, RequestStatus, StatusHistoryEntry,
    Transition,
};
use uuid::Uuid;

use super::clock::{Clock, IdGenerator};
use crate::error::{AppError, AppResult};
use crate::gateway::PersistenceGateway;

/// Creates requests and moves them through the state machine one at a time
#[derive(Clone)]
pub struct WorkflowService {
    gateway: Arc<dyn PersistenceGateway>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl WorkflowService {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self { gateway, clock, ids }
    }

    /// Submit a new request in `operations_submitted`
    pub async fn create_request(
        &self,
        input: CreateRequestInput,
        actor: &Actor,
    ) -> AppResult<PurchaseRequest> {
        let now = self.clock.now();
        let request = PurchaseRequest::submit(&input, self.ids.request_ids(now), None, actor, now)?;
        self.gateway.insert_batch(None, std::slice::from_ref(&request)).await?;

        tracing::info!(
            request_id = %request.request_id,
            actor = %actor.uid,
            "Purchase request submitted"
        );
        Ok(request)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<PurchaseRequest> {
        tracing::debug!(%id, "Loading purchase request");
        self.gateway
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Request {}", id)))
    }

    /// Candidates for a bulk operation
    pub async fn list_by_status(&self, status: RequestStatus) -> AppResult<Vec<PurchaseRequest>> {
        tracing::debug!(status = %status, "Listing purchase requests");
        self.gateway.list_by_status(status).await
    }

    /// History ordered by time for display
    pub async fn history(&self, id: Uuid) -> AppResult<Vec<StatusHistoryEntry>> {
        let request = self.get(id).await?;
        Ok(request.history().sorted_by_time().into_iter().cloned().collect())
    }

    /// Validate a transition against the current stored state and commit it.
    ///
    /// The state is re-read right before validation; the gateway's
    /// compare-and-set turns a concurrent winner into `StateMismatch`.
    pub async fn transition(
        &self,
        id: Uuid,
        transition: &Transition,
        actor: &Actor,
    ) -> AppResult<PurchaseRequest> {
        let request = self.get(id).await?;
        let from = request.status();

        let update = match apply(&request, transition, actor, self.clock.now()) {
            Ok(update) => update,
            Err(e) => {
                tracing::warn!(
                    request_id = %request.request_id,
                    transition = transition.input.name(),
                    error = %e,
                    "Transition rejected"
                );
                return Err(e.into());
            }
        };

        let committed = self.gateway.commit(&update).await.map_err(|e| {
            tracing::warn!(request_id = %request.request_id, error = %e, "Commit failed");
            e
        })?;

        tracing::info!(
            request_id = %committed.request_id,
            from = %from,
            to = %committed.status(),
            actor = %actor.uid,
            "Transition committed"
        );
        Ok(committed)
    }
}
