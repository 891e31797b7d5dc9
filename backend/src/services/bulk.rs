//! Bulk transition service
//!
//! `prepare` opens a [`BulkForm`] over requests sharing one status; `commit`
//! re-reads them, plans every update and writes the batch. On a store
//! without atomic batches the writes are buffered until the whole batch
//! validated and then issued one by one; a failure part-way is reported as
//! `PartialCommit` naming what landed.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use shared::{Actor, BulkForm, BulkProcess, PurchaseRequest, WorkflowError};
use uuid::Uuid;

use super::clock::Clock;
use crate::error::{AppError, AppResult, FailedWrite};
use crate::gateway::PersistenceGateway;

/// Result of a committed bulk operation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub process: BulkProcess,
    pub summary: String,
    pub requests: Vec<PurchaseRequest>,
}

#[derive(Clone)]
pub struct BulkTransitionService {
    gateway: Arc<dyn PersistenceGateway>,
    clock: Arc<dyn Clock>,
    max_bulk_size: usize,
    atomic_batches: bool,
}

impl BulkTransitionService {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        clock: Arc<dyn Clock>,
        max_bulk_size: usize,
        atomic_batches: bool,
    ) -> Self {
        Self {
            gateway,
            clock,
            max_bulk_size,
            atomic_batches,
        }
    }

    fn check_ids(&self, ids: &[Uuid]) -> AppResult<()> {
        if ids.is_empty() {
            return Err(WorkflowError::EmptyBatch.into());
        }
        if ids.len() > self.max_bulk_size {
            return Err(WorkflowError::validation(
                "requestIds",
                format!("at most {} requests per bulk operation", self.max_bulk_size),
            )
            .into());
        }
        let mut seen = HashSet::with_capacity(ids.len());
        if let Some(repeated) = ids.iter().find(|id| !seen.insert(**id)) {
            return Err(WorkflowError::validation(
                "requestIds",
                format!("request {} is selected more than once", repeated),
            )
            .into());
        }
        Ok(())
    }

    async fn load(&self, ids: &[Uuid]) -> AppResult<Vec<PurchaseRequest>> {
        let requests = self.gateway.get_many(ids).await?;
        if let Some(missing) = ids.iter().find(|id| !requests.iter().any(|r| r.id == **id)) {
            return Err(AppError::NotFound(format!("Request {}", missing)));
        }
        Ok(requests)
    }

    /// Open a bulk form over `ids`
    pub async fn prepare(&self, ids: &[Uuid]) -> AppResult<BulkForm> {
        self.check_ids(ids)?;
        let requests = self.load(ids).await?;
        let form = BulkForm::new(&requests)?;
        tracing::debug!(
            process = form.process().as_str(),
            count = form.len(),
            "Bulk form prepared"
        );
        Ok(form)
    }

    /// Validate the whole form against fresh state and commit it
    pub async fn commit(&self, form: &BulkForm, actor: &Actor) -> AppResult<BulkOutcome> {
        let ids = form.request_ids();
        self.check_ids(&ids)?;
        let fresh = self.load(&ids).await?;

        let plan = form.plan(&fresh, actor, self.clock.now()).map_err(|e| {
            tracing::warn!(
                process = form.process().as_str(),
                request_id = e.failing_request().unwrap_or("-"),
                error = %e,
                "Bulk transition rejected"
            );
            AppError::from(e)
        })?;

        let requests = if self.atomic_batches && self.gateway.supports_atomic_batch() {
            self.gateway.commit_batch(&plan.updates).await?
        } else {
            self.commit_buffered(&plan.updates).await?
        };

        tracing::info!(
            process = plan.process.as_str(),
            count = requests.len(),
            actor = %actor.uid,
            "Bulk transition committed"
        );
        Ok(BulkOutcome {
            process: plan.process,
            summary: plan.summary,
            requests,
        })
    }

    /// Issue already-validated writes one at a time
    async fn commit_buffered(
        &self,
        updates: &[shared::RequestUpdate],
    ) -> AppResult<Vec<PurchaseRequest>> {
        let mut committed = Vec::with_capacity(updates.len());
        let mut failed = Vec::new();
        let mut first_error = None;

        for update in updates {
            match self.gateway.commit(update).await {
                Ok(request) => committed.push(request),
                Err(e) => {
                    failed.push(FailedWrite {
                        request_id: update.request_id().to_string(),
                        code: e.code().to_string(),
                        message: e.to_string(),
                    });
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            None => Ok(committed),
            // Nothing landed, so the batch is still all-or-nothing
            Some(e) if committed.is_empty() => Err(e),
            Some(_) => {
                let succeeded: Vec<String> =
                    committed.iter().map(|r| r.request_id.clone()).collect();
                tracing::warn!(
                    succeeded = succeeded.len(),
                    failed = failed.len(),
                    "Bulk transition partially committed"
                );
                Err(AppError::PartialCommit { succeeded, failed })
            }
        }
    }
}
