//! 客户平台仓储

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;

use super::traits::PlatformRepositoryTrait;
use super::{insert_event, insert_todo, is_unique_violation, qualified};
use crate::error::{CrmError, Result};
use crate::models::{AttemptUpdate, ClientPlatform, NewEvent, NewPlatform, NewTodo, VerificationStatus};

const PLATFORM_COLUMNS: &str = "id, client_id, kind, account_ref, status, attempts, \
     last_attempt_at, balance, verified_at, created_at, updated_at";

pub struct PlatformRepository {
    pool: PgPool,
}

impl PlatformRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlatformRepositoryTrait for PlatformRepository {
    async fn get(&self, id: i64) -> Result<Option<ClientPlatform>> {
        let sql = format!("SELECT {PLATFORM_COLUMNS} FROM client_platforms WHERE id = $1");
        let platform = sqlx::query_as::<_, ClientPlatform>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(platform)
    }

    async fn list_by_client(&self, client_id: i64) -> Result<Vec<ClientPlatform>> {
        let sql = format!(
            "SELECT {PLATFORM_COLUMNS} FROM client_platforms WHERE client_id = $1 ORDER BY id"
        );
        let platforms = sqlx::query_as::<_, ClientPlatform>(&sql)
            .bind(client_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(platforms)
    }

    async fn create(&self, platform: &NewPlatform, event: &NewEvent) -> Result<ClientPlatform> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO client_platforms (client_id, kind, account_ref)
            VALUES ($1, $2, $3)
            RETURNING {PLATFORM_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, ClientPlatform>(&sql)
            .bind(platform.client_id)
            .bind(platform.kind)
            .bind(&platform.account_ref)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e, "uq_client_platform_kind") {
                    CrmError::PlatformAlreadyExists(platform.kind.display_name().to_string())
                } else {
                    CrmError::from(e)
                }
            })?;

        insert_event(&mut tx, event).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn request_verification(
        &self,
        id: i64,
        event: &NewEvent,
    ) -> Result<Option<ClientPlatform>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE client_platforms SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status IN ($3, $4)
            RETURNING {PLATFORM_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, ClientPlatform>(&sql)
            .bind(id)
            .bind(VerificationStatus::Pending)
            .bind(VerificationStatus::NotStarted)
            .bind(VerificationStatus::Failed)
            .fetch_optional(&mut *tx)
            .await?;

        if updated.is_some() {
            insert_event(&mut tx, event).await?;
            tx.commit().await?;
        }
        Ok(updated)
    }

    async fn record_attempt(
        &self,
        update: &AttemptUpdate,
        event: &NewEvent,
        todo: Option<NewTodo>,
    ) -> Result<Option<ClientPlatform>> {
        let mut tx = self.pool.begin().await?;

        // 以读取时的失败次数作为乐观锁，并拒绝已验证或已锁定的平台
        let sql = format!(
            r#"
            UPDATE client_platforms
            SET status = $3, attempts = $4, last_attempt_at = $5,
                verified_at = COALESCE($6, verified_at), updated_at = NOW()
            WHERE id = $1 AND attempts = $2 AND status NOT IN ($7, $8)
            RETURNING {PLATFORM_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, ClientPlatform>(&sql)
            .bind(update.platform_id)
            .bind(update.expected_attempts)
            .bind(update.status)
            .bind(update.attempts)
            .bind(update.attempted_at)
            .bind(update.verified_at)
            .bind(VerificationStatus::Verified)
            .bind(VerificationStatus::Locked)
            .fetch_optional(&mut *tx)
            .await?;

        if updated.is_some() {
            insert_event(&mut tx, event).await?;
            if let Some(todo) = &todo {
                insert_todo(&mut tx, todo).await?;
            }
            tx.commit().await?;
        }
        Ok(updated)
    }

    async fn unlock(&self, id: i64, event: &NewEvent) -> Result<Option<ClientPlatform>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE client_platforms SET status = $2, attempts = 0, updated_at = NOW()
            WHERE id = $1 AND status = $3
            RETURNING {PLATFORM_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, ClientPlatform>(&sql)
            .bind(id)
            .bind(VerificationStatus::Failed)
            .bind(VerificationStatus::Locked)
            .fetch_optional(&mut *tx)
            .await?;

        if updated.is_some() {
            insert_event(&mut tx, event).await?;
            tx.commit().await?;
        }
        Ok(updated)
    }

    async fn update_balance(
        &self,
        id: i64,
        balance: Decimal,
        event: &NewEvent,
    ) -> Result<Option<ClientPlatform>> {
        let mut tx = self.pool.begin().await?;

        // 已结案客户的余额不再变动
        let sql = format!(
            r#"
            UPDATE client_platforms p SET balance = $2, updated_at = NOW()
            FROM clients c
            WHERE p.id = $1 AND c.id = p.client_id AND c.status <> 'closed'
            RETURNING {}
            "#,
            qualified(PLATFORM_COLUMNS, "p")
        );
        let updated = sqlx::query_as::<_, ClientPlatform>(&sql)
            .bind(id)
            .bind(balance)
            .fetch_optional(&mut *tx)
            .await?;

        if updated.is_some() {
            insert_event(&mut tx, event).await?;
            tx.commit().await?;
        }
        Ok(updated)
    }
}
