//! PostgreSQL gateway
//!
//! Requests are JSONB documents. `status`, `request_id` and `set_id` are
//! mirrored into columns for lookup. `version` mirrors the history length,
//! and every update is guarded by `WHERE id = $1 AND status = $2 AND
//! version = $3` inside a transaction.

use async_trait::async_trait;
use shared::{MultiPartRequest, PurchaseRequest, RequestStatus, RequestUpdate, WorkflowError};
use sqlx::{types::Json, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::PersistenceGateway;
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct PgGateway {
    db: PgPool,
}

impl PgGateway {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn insert_request(
        tx: &mut Transaction<'_, Postgres>,
        request: &PurchaseRequest,
    ) -> AppResult<()> {
        let membership = request.set_membership();
        sqlx::query(
            r#"
            INSERT INTO purchase_requests
                (id, request_id, status, version, set_id, part_order_in_set, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(request.id)
        .bind(&request.request_id)
        .bind(request.status().as_str())
        .bind(version_column(request.version()))
        .bind(membership.map(|m| m.set_id.clone()))
        .bind(membership.map(|m| m.part_order_in_set as i32))
        .bind(Json(request))
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Read, apply and write back one update inside `tx`
    async fn apply(
        tx: &mut Transaction<'_, Postgres>,
        update: &RequestUpdate,
    ) -> AppResult<PurchaseRequest> {
        let stored = sqlx::query_scalar::<_, Json<PurchaseRequest>>(
            "SELECT document FROM purchase_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(update.id())
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Request {}", update.request_id())))?;

        let mut request = stored.0;
        request.apply_update(update)?;

        let result = sqlx::query(
            r#"
            UPDATE purchase_requests
            SET status = $4, version = $5, document = $6, updated_at = $7
            WHERE id = $1 AND status = $2 AND version = $3
            "#,
        )
        .bind(update.id())
        .bind(update.from().as_str())
        .bind(version_column(update.version()))
        .bind(request.status().as_str())
        .bind(version_column(request.version()))
        .bind(Json(&request))
        .bind(request.updated_at)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Workflow(WorkflowError::StateMismatch {
                request_id: update.request_id().to_string(),
                expected: vec![update.from()],
                actual: request.status(),
            }));
        }
        Ok(request)
    }
}

fn version_column(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}

#[async_trait]
impl PersistenceGateway for PgGateway {
    async fn get(&self, id: Uuid) -> AppResult<Option<PurchaseRequest>> {
        let document = sqlx::query_scalar::<_, Json<PurchaseRequest>>(
            "SELECT document FROM purchase_requests WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(document.map(|d| d.0))
    }

    async fn get_many(&self, ids: &[Uuid]) -> AppResult<Vec<PurchaseRequest>> {
        let documents = sqlx::query_scalar::<_, Json<PurchaseRequest>>(
            "SELECT document FROM purchase_requests WHERE id = ANY($1) ORDER BY request_id",
        )
        .bind(ids.to_vec())
        .fetch_all(&self.db)
        .await?;
        Ok(documents.into_iter().map(|d| d.0).collect())
    }

    async fn list_by_status(&self, status: RequestStatus) -> AppResult<Vec<PurchaseRequest>> {
        let documents = sqlx::query_scalar::<_, Json<PurchaseRequest>>(
            "SELECT document FROM purchase_requests WHERE status = $1 ORDER BY request_id",
        )
        .bind(status.as_str())
        .fetch_all(&self.db)
        .await?;
        Ok(documents.into_iter().map(|d| d.0).collect())
    }

    async fn find_by_set(&self, set_id: &str) -> AppResult<Vec<PurchaseRequest>> {
        let documents = sqlx::query_scalar::<_, Json<PurchaseRequest>>(
            "SELECT document FROM purchase_requests WHERE set_id = $1 ORDER BY part_order_in_set",
        )
        .bind(set_id)
        .fetch_all(&self.db)
        .await?;
        Ok(documents.into_iter().map(|d| d.0).collect())
    }

    async fn get_set(&self, set_id: &str) -> AppResult<Option<MultiPartRequest>> {
        let document = sqlx::query_scalar::<_, Json<MultiPartRequest>>(
            "SELECT document FROM multi_part_requests WHERE set_id = $1",
        )
        .bind(set_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(document.map(|d| d.0))
    }

    async fn insert_batch(
        &self,
        set: Option<&MultiPartRequest>,
        requests: &[PurchaseRequest],
    ) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        if let Some(set) = set {
            sqlx::query(
                r#"
                INSERT INTO multi_part_requests (set_id, document, created_at, updated_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(set.set_id())
            .bind(Json(set))
            .bind(set.created_at)
            .bind(set.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        for request in requests {
            Self::insert_request(&mut tx, request).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn commit(&self, update: &RequestUpdate) -> AppResult<PurchaseRequest> {
        let mut tx = self.db.begin().await?;
        let request = Self::apply(&mut tx, update).await?;
        tx.commit().await?;
        Ok(request)
    }

    async fn commit_batch(&self, updates: &[RequestUpdate]) -> AppResult<Vec<PurchaseRequest>> {
        // Dropping the transaction on error rolls every write back
        let mut tx = self.db.begin().await?;
        let mut committed = Vec::with_capacity(updates.len());
        for update in updates {
            committed.push(Self::apply(&mut tx, update).await?);
        }
        tx.commit().await?;
        Ok(committed)
    }

    async fn update_set_summary(&self, set: &MultiPartRequest) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE multi_part_requests SET document = $2, updated_at = $3 WHERE set_id = $1",
        )
        .bind(set.set_id())
        .bind(Json(set))
        .bind(set.updated_at)
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Set {}", set.set_id())));
        }
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.db).await.is_ok()
    }
}
