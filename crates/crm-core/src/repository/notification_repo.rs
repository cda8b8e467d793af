//! 通知仓储

use async_trait::async_trait;
use sqlx::PgPool;

use super::traits::NotificationRepositoryTrait;
use crate::error::Result;
use crate::models::{NewNotification, Notification, Page, Paging};

const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, title, body, client_id, read_at, created_at";

pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepositoryTrait for NotificationRepository {
    async fn create_many(&self, notifications: &[NewNotification]) -> Result<u64> {
        if notifications.is_empty() {
            return Ok(0);
        }

        // UNNEST 一次写入所有收件人
        let user_ids: Vec<i64> = notifications.iter().map(|n| n.user_id).collect();
        let kinds: Vec<&str> = notifications.iter().map(|n| n.draft.kind.as_str()).collect();
        let titles: Vec<&str> = notifications.iter().map(|n| n.draft.title.as_str()).collect();
        let bodies: Vec<&str> = notifications.iter().map(|n| n.draft.body.as_str()).collect();
        let client_ids: Vec<Option<i64>> = notifications.iter().map(|n| n.draft.client_id).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO notifications (user_id, kind, title, body, client_id)
            SELECT * FROM UNNEST($1::bigint[], $2::varchar[], $3::varchar[], $4::text[], $5::bigint[])
            "#,
        )
        .bind(&user_ids)
        .bind(&kinds)
        .bind(&titles)
        .bind(&bodies)
        .bind(&client_ids)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list(
        &self,
        user_id: i64,
        unread_only: bool,
        paging: Paging,
    ) -> Result<Page<Notification>> {
        let condition = "user_id = $1 AND (NOT $2 OR read_at IS NULL)";

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM notifications WHERE {condition}"))
                .bind(user_id)
                .bind(unread_only)
                .fetch_one(&self.pool)
                .await?;

        let sql = format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS} FROM notifications
            WHERE {condition}
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#
        );
        let items = sqlx::query_as::<_, Notification>(&sql)
            .bind(user_id)
            .bind(unread_only)
            .bind(paging.limit)
            .bind(paging.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(items, total))
    }

    async fn unread_count(&self, user_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn mark_read(&self, id: i64, user_id: i64) -> Result<bool> {
        // 已读的再次标记也视为命中
        let result = sqlx::query(
            r#"
            UPDATE notifications SET read_at = COALESCE(read_at, NOW())
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_read(&self, user_id: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = NOW() WHERE user_id = $1 AND read_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
