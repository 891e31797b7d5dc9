//! In-memory gateway for tests and embedding

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use shared::{MultiPartRequest, PurchaseRequest, RequestStatus, RequestUpdate};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::PersistenceGateway;
use crate::error::{AppError, AppResult};

#[derive(Default)]
struct Store {
    requests: HashMap<Uuid, PurchaseRequest>,
    sets: HashMap<String, MultiPartRequest>,
}

/// Gateway backed by a map behind a lock.
///
/// `non_atomic()` builds one whose batch commit applies writes one by one
/// and stops at the first failure, like a store without transactions.
/// `fail_writes_for` injects a storage failure for one request.
#[derive(Clone, Default)]
pub struct InMemoryGateway {
    store: Arc<RwLock<Store>>,
    failing: Arc<RwLock<HashSet<Uuid>>>,
    non_atomic: bool,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn non_atomic() -> Self {
        Self {
            non_atomic: true,
            ..Self::default()
        }
    }

    /// Make every later write of `id` fail with a storage error
    pub async fn fail_writes_for(&self, id: Uuid) {
        self.failing.write().await.insert(id);
    }

    pub async fn heal(&self, id: Uuid) {
        self.failing.write().await.remove(&id);
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.requests.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn check_writable(&self, id: Uuid, request_id: &str) -> AppResult<()> {
        if self.failing.read().await.contains(&id) {
            return Err(AppError::StorageError(format!("write of {} failed", request_id)));
        }
        Ok(())
    }

    fn apply(store: &mut Store, update: &RequestUpdate) -> AppResult<PurchaseRequest> {
        let request = store
            .requests
            .get_mut(&update.id())
            .ok_or_else(|| AppError::NotFound(format!("Request {}", update.request_id())))?;
        request.apply_update(update)?;
        Ok(request.clone())
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn get(&self, id: Uuid) -> AppResult<Option<PurchaseRequest>> {
        Ok(self.store.read().await.requests.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[Uuid]) -> AppResult<Vec<PurchaseRequest>> {
        let store = self.store.read().await;
        Ok(ids.iter().filter_map(|id| store.requests.get(id).cloned()).collect())
    }

    async fn list_by_status(&self, status: RequestStatus) -> AppResult<Vec<PurchaseRequest>> {
        let store = self.store.read().await;
        let mut requests: Vec<PurchaseRequest> = store
            .requests
            .values()
            .filter(|r| r.status() == status)
            .cloned()
            .collect();
        requests.sort_by(|a, b| a.request_id.cmp(&b.request_id));
        Ok(requests)
    }

    async fn find_by_set(&self, set_id: &str) -> AppResult<Vec<PurchaseRequest>> {
        let store = self.store.read().await;
        let mut members: Vec<PurchaseRequest> = store
            .requests
            .values()
            .filter(|r| r.set_membership().map(|m| m.set_id == set_id).unwrap_or(false))
            .cloned()
            .collect();
        members.sort_by_key(|r| r.set_membership().map(|m| m.part_order_in_set));
        Ok(members)
    }

    async fn get_set(&self, set_id: &str) -> AppResult<Option<MultiPartRequest>> {
        Ok(self.store.read().await.sets.get(set_id).cloned())
    }

    async fn insert_batch(
        &self,
        set: Option<&MultiPartRequest>,
        requests: &[PurchaseRequest],
    ) -> AppResult<()> {
        for request in requests {
            self.check_writable(request.id, &request.request_id).await?;
        }

        let mut store = self.store.write().await;
        let mut seen = HashSet::new();
        for request in requests {
            let taken = store.requests.contains_key(&request.id)
                || store.requests.values().any(|r| r.request_id == request.request_id);
            if taken || !seen.insert(request.request_id.as_str()) {
                return Err(AppError::StorageError(format!(
                    "request {} already exists",
                    request.request_id
                )));
            }
        }
        if let Some(set) = set {
            if store.sets.contains_key(set.set_id()) {
                return Err(AppError::StorageError(format!("set {} already exists", set.set_id())));
            }
            store.sets.insert(set.set_id().to_string(), set.clone());
        }
        for request in requests {
            store.requests.insert(request.id, request.clone());
        }
        Ok(())
    }

    async fn commit(&self, update: &RequestUpdate) -> AppResult<PurchaseRequest> {
        self.check_writable(update.id(), update.request_id()).await?;
        let mut store = self.store.write().await;
        Self::apply(&mut store, update)
    }

    async fn commit_batch(&self, updates: &[RequestUpdate]) -> AppResult<Vec<PurchaseRequest>> {
        if self.non_atomic {
            let mut committed = Vec::with_capacity(updates.len());
            for update in updates {
                committed.push(self.commit(update).await?);
            }
            return Ok(committed);
        }

        for update in updates {
            self.check_writable(update.id(), update.request_id()).await?;
        }
        let mut store = self.store.write().await;

        // Apply on copies so a failure leaves the store untouched
        let mut staged: HashMap<Uuid, PurchaseRequest> = HashMap::new();
        for update in updates {
            let mut request = match staged.remove(&update.id()) {
                Some(request) => request,
                None => store
                    .requests
                    .get(&update.id())
                    .cloned()
                    .ok_or_else(|| AppError::NotFound(format!("Request {}", update.request_id())))?,
            };
            request.apply_update(update)?;
            staged.insert(update.id(), request);
        }

        let committed = updates
            .iter()
            .filter_map(|u| staged.get(&u.id()).cloned())
            .collect();
        store.requests.extend(staged);
        Ok(committed)
    }

    async fn update_set_summary(&self, set: &MultiPartRequest) -> AppResult<()> {
        let mut store = self.store.write().await;
        match store.sets.get_mut(set.set_id()) {
            Some(stored) => {
                *stored = set.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Set {}", set.set_id()))),
        }
    }

    fn supports_atomic_batch(&self) -> bool {
        !self.non_atomic
    }
}
