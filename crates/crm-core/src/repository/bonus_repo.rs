//! 奖金池仓储

use async_trait::async_trait;
use sqlx::PgPool;

use super::insert_event;
use super::traits::BonusRepositoryTrait;
use crate::error::Result;
use crate::models::{
    BonusAllocation, BonusPool, NewAllocation, NewBonusPool, NewEvent, Page, Paging, PoolFilter,
    PoolStatus,
};

const POOL_COLUMNS: &str = "id, client_id, closer_id, total_amount, direct_amount, status, note, \
     created_by, created_at, allocated_at, settled_at";

const ALLOCATION_COLUMNS: &str = "id, pool_id, agent_id, kind, star_level, amount, created_at";

pub struct BonusRepository {
    pool: PgPool,
}

impl BonusRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BonusRepositoryTrait for BonusRepository {
    async fn get_pool(&self, id: i64) -> Result<Option<BonusPool>> {
        let sql = format!("SELECT {POOL_COLUMNS} FROM bonus_pools WHERE id = $1");
        let pool = sqlx::query_as::<_, BonusPool>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(pool)
    }

    async fn list_pools(&self, filter: &PoolFilter, paging: Paging) -> Result<Page<BonusPool>> {
        let condition = r#"
            ($1::bigint IS NULL OR client_id = $1)
            AND ($2::varchar IS NULL OR status = $2)
        "#;

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM bonus_pools WHERE {condition}"))
                .bind(filter.client_id)
                .bind(filter.status)
                .fetch_one(&self.pool)
                .await?;

        let sql = format!(
            r#"
            SELECT {POOL_COLUMNS} FROM bonus_pools
            WHERE {condition}
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#
        );
        let items = sqlx::query_as::<_, BonusPool>(&sql)
            .bind(filter.client_id)
            .bind(filter.status)
            .bind(paging.limit)
            .bind(paging.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(items, total))
    }

    async fn list_allocations(&self, pool_id: i64) -> Result<Vec<BonusAllocation>> {
        let sql = format!(
            "SELECT {ALLOCATION_COLUMNS} FROM bonus_allocations WHERE pool_id = $1 ORDER BY id"
        );
        let allocations = sqlx::query_as::<_, BonusAllocation>(&sql)
            .bind(pool_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(allocations)
    }

    async fn create_pool(&self, new_pool: &NewBonusPool, event: &NewEvent) -> Result<BonusPool> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO bonus_pools (client_id, closer_id, total_amount, direct_amount, note, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {POOL_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, BonusPool>(&sql)
            .bind(new_pool.client_id)
            .bind(new_pool.closer_id)
            .bind(new_pool.total_amount)
            .bind(new_pool.direct_amount)
            .bind(&new_pool.note)
            .bind(new_pool.created_by)
            .fetch_one(&mut *tx)
            .await?;

        insert_event(&mut tx, event).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn save_allocations(
        &self,
        pool_id: i64,
        lines: &[NewAllocation],
        event: &NewEvent,
    ) -> Result<Option<BonusPool>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE bonus_pools SET status = $2, allocated_at = NOW()
            WHERE id = $1 AND status = $3
            RETURNING {POOL_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, BonusPool>(&sql)
            .bind(pool_id)
            .bind(PoolStatus::Allocated)
            .bind(PoolStatus::Draft)
            .fetch_optional(&mut *tx)
            .await?;

        if updated.is_none() {
            return Ok(None);
        }

        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO bonus_allocations (pool_id, agent_id, kind, star_level, amount)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(pool_id)
            .bind(line.agent_id)
            .bind(line.kind)
            .bind(line.star_level)
            .bind(line.amount)
            .execute(&mut *tx)
            .await?;
        }

        insert_event(&mut tx, event).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn settle(&self, pool_id: i64, event: &NewEvent) -> Result<Option<BonusPool>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE bonus_pools SET status = $2, settled_at = NOW()
            WHERE id = $1 AND status = $3
            RETURNING {POOL_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, BonusPool>(&sql)
            .bind(pool_id)
            .bind(PoolStatus::Settled)
            .bind(PoolStatus::Allocated)
            .fetch_optional(&mut *tx)
            .await?;

        if updated.is_some() {
            insert_event(&mut tx, event).await?;
            tx.commit().await?;
        }
        Ok(updated)
    }
}
