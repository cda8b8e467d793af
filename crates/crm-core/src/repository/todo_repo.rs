//! 待办仓储

use async_trait::async_trait;
use sqlx::PgPool;

use super::traits::TodoRepositoryTrait;
use super::{TODO_COLUMNS, insert_todo};
use crate::error::Result;
use crate::models::{NewTodo, Page, Paging, Todo, TodoFilter, TodoStatus};

pub struct TodoRepository {
    pool: PgPool,
}

impl TodoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TodoRepositoryTrait for TodoRepository {
    async fn get(&self, id: i64) -> Result<Option<Todo>> {
        let sql = format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = $1");
        let todo = sqlx::query_as::<_, Todo>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(todo)
    }

    async fn list(&self, filter: &TodoFilter, paging: Paging) -> Result<Page<Todo>> {
        let condition = r#"
            ($1::bigint IS NULL OR assignee_id = $1)
            AND ($2::bigint IS NULL OR client_id = $2)
            AND ($3::varchar IS NULL OR status = $3)
            AND (NOT $4 OR (status = 'open' AND due_at < NOW()))
        "#;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM todos WHERE {condition}"))
            .bind(filter.assignee_id)
            .bind(filter.client_id)
            .bind(filter.status)
            .bind(filter.overdue_only)
            .fetch_one(&self.pool)
            .await?;

        // 未完成的在前，按截止时间排序
        let sql = format!(
            r#"
            SELECT {TODO_COLUMNS} FROM todos
            WHERE {condition}
            ORDER BY (status = 'open') DESC, due_at ASC NULLS LAST, id DESC
            LIMIT $5 OFFSET $6
            "#
        );
        let items = sqlx::query_as::<_, Todo>(&sql)
            .bind(filter.assignee_id)
            .bind(filter.client_id)
            .bind(filter.status)
            .bind(filter.overdue_only)
            .bind(paging.limit)
            .bind(paging.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(items, total))
    }

    async fn create(&self, todo: &NewTodo) -> Result<Todo> {
        let mut conn = self.pool.acquire().await?;
        insert_todo(&mut conn, todo).await
    }

    async fn set_status(&self, id: i64, from: TodoStatus, to: TodoStatus) -> Result<Option<Todo>> {
        let sql = format!(
            r#"
            UPDATE todos
            SET status = $3,
                completed_at = CASE WHEN $3 = 'done' THEN NOW() ELSE NULL END,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {TODO_COLUMNS}
            "#
        );
        let todo = sqlx::query_as::<_, Todo>(&sql)
            .bind(id)
            .bind(from)
            .bind(to)
            .fetch_optional(&self.pool)
            .await?;
        Ok(todo)
    }
}
