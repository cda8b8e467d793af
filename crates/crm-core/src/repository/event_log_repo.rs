//! 事件日志仓储
//!
//! 写入只在各业务仓储的事务内通过 `insert_event` 进行，这里只负责查询。

use async_trait::async_trait;
use sqlx::PgPool;

use super::traits::EventLogRepositoryTrait;
use crate::error::Result;
use crate::models::{EventLog, Page, Paging};

pub struct EventLogRepository {
    pool: PgPool,
}

impl EventLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventLogRepositoryTrait for EventLogRepository {
    async fn list_by_client(&self, client_id: i64, paging: Paging) -> Result<Page<EventLog>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM event_logs WHERE client_id = $1")
            .bind(client_id)
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query_as::<_, EventLog>(
            r#"
            SELECT id, client_id, actor_id, event_type, payload, created_at
            FROM event_logs
            WHERE client_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(client_id)
        .bind(paging.limit)
        .bind(paging.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(items, total))
    }
}
