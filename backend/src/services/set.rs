//! Multi-part sets and batches of independent parts

use std::sync::Arc;

use serde::Serialize;
use shared::{
    build_batch, build_set, Actor, CreateRequestInput, CreateSetInput, MultiPartRequest,
    PurchaseRequest, RecordIds, SetProgress,
};

use super::clock::{Clock, IdGenerator};
use crate::error::{AppError, AppResult};
use crate::gateway::PersistenceGateway;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSet {
    pub set: MultiPartRequest,
    pub parts: Vec<PurchaseRequest>,
}

#[derive(Clone)]
pub struct SetService {
    gateway: Arc<dyn PersistenceGateway>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl SetService {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self { gateway, clock, ids }
    }

    fn member_ids(&self, count: usize, now: chrono::DateTime<chrono::Utc>) -> Vec<RecordIds> {
        (0..count).map(|_| self.ids.request_ids(now)).collect()
    }

    /// Create a set record and all its parts in one atomic insert
    pub async fn create_set(&self, input: CreateSetInput, actor: &Actor) -> AppResult<CreatedSet> {
        let now = self.clock.now();
        let set_id = self.ids.set_id(now);
        let (set, parts) = build_set(&input, &set_id, self.member_ids(input.parts.len(), now), actor, now)?;

        self.gateway.insert_batch(Some(&set), &parts).await?;

        tracing::info!(
            set_id = %set.set_id(),
            parts = parts.len(),
            actor = %actor.uid,
            "Multi-part set created"
        );
        Ok(CreatedSet { set, parts })
    }

    /// Create independent requests together; none is stored unless all are valid
    pub async fn create_batch(
        &self,
        parts: Vec<CreateRequestInput>,
        actor: &Actor,
    ) -> AppResult<Vec<PurchaseRequest>> {
        let now = self.clock.now();
        let requests = build_batch(&parts, self.member_ids(parts.len(), now), actor, now)?;
        self.gateway.insert_batch(None, &requests).await?;

        tracing::info!(count = requests.len(), actor = %actor.uid, "Request batch created");
        Ok(requests)
    }

    /// Derive progress from the members and refresh the cached summary.
    ///
    /// A failed refresh is logged; the derived progress is still returned.
    pub async fn progress(&self, set_id: &str) -> AppResult<SetProgress> {
        let mut set = self
            .gateway
            .get_set(set_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Set {}", set_id)))?;
        let members = self.gateway.find_by_set(set_id).await?;
        let progress = SetProgress::from_members(set_id, &members);
        tracing::debug!(set_id, completed = progress.completed, total = progress.total, "Set progress derived");

        if set.completed_parts_count() != progress.completed
            || set.overall_status() != progress.overall_status
        {
            set.refresh(&progress, self.clock.now());
            if let Err(e) = self.gateway.update_set_summary(&set).await {
                tracing::warn!(set_id, error = %e, "Could not refresh set summary");
            }
        }
        Ok(progress)
    }
}
