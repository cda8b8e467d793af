//! 客户仓储
//!
//! 所有状态写入都带前置状态条件，并与事件日志同事务提交。

use async_trait::async_trait;
use sqlx::PgPool;

use super::traits::{ClientRepositoryTrait, ClientTransition};
use super::{insert_event, insert_todo, like_pattern};
use crate::error::Result;
use crate::models::{
    Client, ClientFilter, ClientStatus, ClientUpdate, NewClient, NewEvent, Page, Paging,
    TodoStatus,
};

const CLIENT_COLUMNS: &str = "id, agent_id, first_name, last_name, email, phone, state, notes, \
     status, status_note, intake_deadline, extension_count, profit_share_rule_id, closed_at, \
     closure_reason, created_at, updated_at";

const FILTER_CONDITION: &str = r#"
    ($1::varchar IS NULL OR status = $1)
    AND ($2::bigint IS NULL OR agent_id = $2)
    AND ($3::text IS NULL
         OR (first_name || ' ' || last_name) ILIKE $3
         OR email ILIKE $3
         OR phone ILIKE $3)
    AND (NOT $4 OR (status IN ('intake', 'pending_review') AND intake_deadline < NOW()))
"#;

pub struct ClientRepository {
    pool: PgPool,
}

impl ClientRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClientRepositoryTrait for ClientRepository {
    async fn get(&self, id: i64) -> Result<Option<Client>> {
        let sql = format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = $1");
        let client = sqlx::query_as::<_, Client>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(client)
    }

    async fn list(&self, filter: &ClientFilter, paging: Paging) -> Result<Page<Client>> {
        let pattern = like_pattern(filter.keyword.as_deref());

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM clients WHERE {FILTER_CONDITION}"))
                .bind(filter.status)
                .bind(filter.agent_id)
                .bind(&pattern)
                .bind(filter.overdue_only)
                .fetch_one(&self.pool)
                .await?;

        let sql = format!(
            r#"
            SELECT {CLIENT_COLUMNS} FROM clients
            WHERE {FILTER_CONDITION}
            ORDER BY created_at DESC, id DESC
            LIMIT $5 OFFSET $6
            "#
        );
        let items = sqlx::query_as::<_, Client>(&sql)
            .bind(filter.status)
            .bind(filter.agent_id)
            .bind(&pattern)
            .bind(filter.overdue_only)
            .bind(paging.limit)
            .bind(paging.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(items, total))
    }

    async fn list_for_export(&self, filter: &ClientFilter, limit: i64) -> Result<Vec<Client>> {
        let pattern = like_pattern(filter.keyword.as_deref());
        let sql = format!(
            r#"
            SELECT {CLIENT_COLUMNS} FROM clients
            WHERE {FILTER_CONDITION}
            ORDER BY id
            LIMIT $5
            "#
        );
        let items = sqlx::query_as::<_, Client>(&sql)
            .bind(filter.status)
            .bind(filter.agent_id)
            .bind(&pattern)
            .bind(filter.overdue_only)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    async fn search(
        &self,
        keyword: &str,
        agent_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Client>> {
        let pattern = like_pattern(Some(keyword));
        // 姓名前缀匹配排在前面
        let sql = format!(
            r#"
            SELECT {CLIENT_COLUMNS} FROM clients
            WHERE ($1::bigint IS NULL OR agent_id = $1)
              AND ((first_name || ' ' || last_name) ILIKE $2 OR email ILIKE $2 OR phone ILIKE $2)
            ORDER BY (first_name ILIKE $3 OR last_name ILIKE $3) DESC, updated_at DESC
            LIMIT $4
            "#
        );
        let prefix = format!("{}%", keyword.trim());
        let items = sqlx::query_as::<_, Client>(&sql)
            .bind(agent_id)
            .bind(&pattern)
            .bind(&prefix)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    async fn create(&self, client: &NewClient, event: &NewEvent) -> Result<Client> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO clients (agent_id, first_name, last_name, email, phone, state, notes, intake_deadline)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {CLIENT_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, Client>(&sql)
            .bind(client.agent_id)
            .bind(&client.first_name)
            .bind(&client.last_name)
            .bind(&client.email)
            .bind(&client.phone)
            .bind(&client.state)
            .bind(&client.notes)
            .bind(client.intake_deadline)
            .fetch_one(&mut *tx)
            .await?;

        // 新建时服务层还不知道 ID
        let event = NewEvent {
            client_id: Some(created.id),
            ..event.clone()
        };
        insert_event(&mut tx, &event).await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn update_contact(
        &self,
        id: i64,
        update: &ClientUpdate,
        event: &NewEvent,
    ) -> Result<Option<Client>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE clients SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                email = COALESCE($4, email),
                phone = COALESCE($5, phone),
                state = COALESCE($6, state),
                notes = COALESCE($7, notes),
                updated_at = NOW()
            WHERE id = $1 AND status NOT IN ('closed', 'rejected')
            RETURNING {CLIENT_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, Client>(&sql)
            .bind(id)
            .bind(&update.first_name)
            .bind(&update.last_name)
            .bind(&update.email)
            .bind(&update.phone)
            .bind(&update.state)
            .bind(&update.notes)
            .fetch_optional(&mut *tx)
            .await?;

        if updated.is_some() {
            insert_event(&mut tx, event).await?;
            tx.commit().await?;
        }
        Ok(updated)
    }

    async fn transition(&self, transition: &ClientTransition) -> Result<Option<Client>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE clients
            SET status = $3,
                status_note = COALESCE($4, status_note),
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {CLIENT_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, Client>(&sql)
            .bind(transition.client_id)
            .bind(transition.from)
            .bind(transition.to)
            .bind(&transition.note)
            .fetch_optional(&mut *tx)
            .await?;

        if updated.is_some() {
            insert_event(&mut tx, &transition.event).await?;
            if let Some(todo) = &transition.todo {
                insert_todo(&mut tx, todo).await?;
            }
            tx.commit().await?;
        }
        Ok(updated)
    }

    async fn assign_agent(
        &self,
        id: i64,
        agent_id: i64,
        event: &NewEvent,
    ) -> Result<Option<Client>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE clients SET agent_id = $2, updated_at = NOW()
            WHERE id = $1 AND status NOT IN ('closed', 'rejected')
            RETURNING {CLIENT_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, Client>(&sql)
            .bind(id)
            .bind(agent_id)
            .fetch_optional(&mut *tx)
            .await?;

        if updated.is_some() {
            insert_event(&mut tx, event).await?;
            tx.commit().await?;
        }
        Ok(updated)
    }

    async fn assign_profit_share_rule(
        &self,
        id: i64,
        rule_id: Option<i64>,
        event: &NewEvent,
    ) -> Result<Option<Client>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE clients SET profit_share_rule_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {CLIENT_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, Client>(&sql)
            .bind(id)
            .bind(rule_id)
            .fetch_optional(&mut *tx)
            .await?;

        if updated.is_some() {
            insert_event(&mut tx, event).await?;
            tx.commit().await?;
        }
        Ok(updated)
    }

    async fn close(&self, id: i64, reason: &str, event: &NewEvent) -> Result<Option<Client>> {
        let mut tx = self.pool.begin().await?;

        // 锁住平台行，避免结案与余额更新并发
        sqlx::query("SELECT id FROM client_platforms WHERE client_id = $1 FOR UPDATE")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let sql = format!(
            r#"
            UPDATE clients
            SET status = $2, closed_at = NOW(), closure_reason = $3, updated_at = NOW()
            WHERE id = $1
              AND status = $4
              AND NOT EXISTS (
                  SELECT 1 FROM client_platforms p WHERE p.client_id = $1 AND p.balance <> 0
              )
            RETURNING {CLIENT_COLUMNS}
            "#
        );
        let closed = sqlx::query_as::<_, Client>(&sql)
            .bind(id)
            .bind(ClientStatus::Closed)
            .bind(reason)
            .bind(ClientStatus::Active)
            .fetch_optional(&mut *tx)
            .await?;

        if closed.is_some() {
            sqlx::query(
                r#"
                UPDATE todos SET status = $2, updated_at = NOW()
                WHERE client_id = $1 AND status = $3
                "#,
            )
            .bind(id)
            .bind(TodoStatus::Cancelled)
            .bind(TodoStatus::Open)
            .execute(&mut *tx)
            .await?;

            insert_event(&mut tx, event).await?;
            tx.commit().await?;
        }
        Ok(closed)
    }
}
