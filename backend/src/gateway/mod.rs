//! Persistence gateway
//!
//! The only way services touch storage. Every write of a request goes
//! through [`RequestUpdate`], which the stores apply as a compare-and-set on
//! the status it was computed from.

use async_trait::async_trait;
use shared::{MultiPartRequest, PurchaseRequest, RequestStatus, RequestUpdate};
use uuid::Uuid;

use crate::error::AppResult;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryGateway;
pub use postgres::PgGateway;

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn get(&self, id: Uuid) -> AppResult<Option<PurchaseRequest>>;

    /// Requests for `ids`; unknown ids are left out
    async fn get_many(&self, ids: &[Uuid]) -> AppResult<Vec<PurchaseRequest>>;

    async fn list_by_status(&self, status: RequestStatus) -> AppResult<Vec<PurchaseRequest>>;

    /// Members of a set in part order
    async fn find_by_set(&self, set_id: &str) -> AppResult<Vec<PurchaseRequest>>;

    async fn get_set(&self, set_id: &str) -> AppResult<Option<MultiPartRequest>>;

    /// Insert new requests (and their set record) all-or-nothing
    async fn insert_batch(
        &self,
        set: Option<&MultiPartRequest>,
        requests: &[PurchaseRequest],
    ) -> AppResult<()>;

    /// Apply one update. Fails with `StateMismatch` when the stored status
    /// no longer matches the one the update was computed from.
    async fn commit(&self, update: &RequestUpdate) -> AppResult<PurchaseRequest>;

    /// Apply every update or none of them
    async fn commit_batch(&self, updates: &[RequestUpdate]) -> AppResult<Vec<PurchaseRequest>>;

    async fn update_set_summary(&self, set: &MultiPartRequest) -> AppResult<()>;

    /// Whether `commit_batch` is truly all-or-nothing
    fn supports_atomic_batch(&self) -> bool {
        true
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}
