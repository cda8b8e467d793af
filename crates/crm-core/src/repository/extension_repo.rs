//! 延期申请仓储

use async_trait::async_trait;
use sqlx::PgPool;

use super::traits::ExtensionRepositoryTrait;
use super::{insert_event, is_unique_violation};
use crate::error::{CrmError, Result};
use crate::models::{
    ExtensionApproval, ExtensionFilter, ExtensionRequest, ExtensionStatus, NewEvent,
    NewExtensionRequest, Page, Paging,
};

const EXTENSION_COLUMNS: &str = "id, client_id, requested_by, requested_days, reason, status, \
     reviewed_by, review_note, previous_deadline, new_deadline, created_at, reviewed_at";

pub struct ExtensionRepository {
    pool: PgPool,
}

impl ExtensionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExtensionRepositoryTrait for ExtensionRepository {
    async fn get(&self, id: i64) -> Result<Option<ExtensionRequest>> {
        let sql = format!("SELECT {EXTENSION_COLUMNS} FROM extension_requests WHERE id = $1");
        let request = sqlx::query_as::<_, ExtensionRequest>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(request)
    }

    async fn list(
        &self,
        filter: &ExtensionFilter,
        paging: Paging,
    ) -> Result<Page<ExtensionRequest>> {
        let condition = r#"
            ($1::bigint IS NULL OR e.client_id = $1)
            AND ($2::varchar IS NULL OR e.status = $2)
            AND ($3::bigint IS NULL OR c.agent_id = $3)
        "#;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM extension_requests e JOIN clients c ON c.id = e.client_id WHERE {condition}"
        ))
        .bind(filter.client_id)
        .bind(filter.status)
        .bind(filter.agent_id)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            r#"
            SELECT {} FROM extension_requests e
            JOIN clients c ON c.id = e.client_id
            WHERE {condition}
            ORDER BY e.created_at DESC, e.id DESC
            LIMIT $4 OFFSET $5
            "#,
            super::qualified(EXTENSION_COLUMNS, "e")
        );
        let items = sqlx::query_as::<_, ExtensionRequest>(&sql)
            .bind(filter.client_id)
            .bind(filter.status)
            .bind(filter.agent_id)
            .bind(paging.limit)
            .bind(paging.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(items, total))
    }

    async fn has_pending(&self, client_id: i64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM extension_requests WHERE client_id = $1 AND status = $2)",
        )
        .bind(client_id)
        .bind(ExtensionStatus::Pending)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn create(
        &self,
        request: &NewExtensionRequest,
        event: &NewEvent,
    ) -> Result<ExtensionRequest> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO extension_requests (client_id, requested_by, requested_days, reason)
            VALUES ($1, $2, $3, $4)
            RETURNING {EXTENSION_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, ExtensionRequest>(&sql)
            .bind(request.client_id)
            .bind(request.requested_by)
            .bind(request.requested_days)
            .bind(&request.reason)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e, "uq_extension_pending_per_client") {
                    CrmError::ExtensionAlreadyPending
                } else {
                    CrmError::from(e)
                }
            })?;

        insert_event(&mut tx, event).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn approve(
        &self,
        approval: &ExtensionApproval,
        event: &NewEvent,
    ) -> Result<Option<ExtensionRequest>> {
        let mut tx = self.pool.begin().await?;

        // 期限未被并发修改、次数未达上限、仍处于入驻阶段时才延长
        let client_updated = sqlx::query(
            r#"
            UPDATE clients
            SET intake_deadline = $3, extension_count = extension_count + 1, updated_at = NOW()
            WHERE id = $1
              AND intake_deadline = $2
              AND extension_count < $4
              AND status IN ('intake', 'pending_review')
            "#,
        )
        .bind(approval.client_id)
        .bind(approval.previous_deadline)
        .bind(approval.new_deadline)
        .bind(approval.max_extensions)
        .execute(&mut *tx)
        .await?;

        if client_updated.rows_affected() == 0 {
            return Ok(None);
        }

        let sql = format!(
            r#"
            UPDATE extension_requests
            SET status = $2, reviewed_by = $3, review_note = $4,
                previous_deadline = $5, new_deadline = $6, reviewed_at = NOW()
            WHERE id = $1 AND status = $7
            RETURNING {EXTENSION_COLUMNS}
            "#
        );
        let approved = sqlx::query_as::<_, ExtensionRequest>(&sql)
            .bind(approval.request_id)
            .bind(ExtensionStatus::Approved)
            .bind(approval.reviewer_id)
            .bind(&approval.note)
            .bind(approval.previous_deadline)
            .bind(approval.new_deadline)
            .bind(ExtensionStatus::Pending)
            .fetch_optional(&mut *tx)
            .await?;

        if approved.is_some() {
            insert_event(&mut tx, event).await?;
            tx.commit().await?;
        }
        Ok(approved)
    }

    async fn reject(
        &self,
        id: i64,
        reviewer_id: i64,
        note: &str,
        event: &NewEvent,
    ) -> Result<Option<ExtensionRequest>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE extension_requests
            SET status = $2, reviewed_by = $3, review_note = $4, reviewed_at = NOW()
            WHERE id = $1 AND status = $5
            RETURNING {EXTENSION_COLUMNS}
            "#
        );
        let rejected = sqlx::query_as::<_, ExtensionRequest>(&sql)
            .bind(id)
            .bind(ExtensionStatus::Rejected)
            .bind(reviewer_id)
            .bind(note)
            .bind(ExtensionStatus::Pending)
            .fetch_optional(&mut *tx)
            .await?;

        if rejected.is_some() {
            insert_event(&mut tx, event).await?;
            tx.commit().await?;
        }
        Ok(rejected)
    }
}
