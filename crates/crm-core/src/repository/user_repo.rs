//! 用户仓储

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::traits::UserRepositoryTrait;
use super::{is_unique_violation, like_pattern, qualified};
use crate::error::{CrmError, Result};
use crate::models::{NewUser, Page, Paging, User, UserFilter, UserRole, UserStatus, UserUpdate};

const USER_COLUMNS: &str = "id, username, password_hash, display_name, email, role, status, \
     supervisor_id, star_level, failed_login_attempts, locked_until, last_login_at, \
     created_at, updated_at";

pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepositoryTrait for UserRepository {
    async fn get(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_many(&self, ids: &[i64]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1) ORDER BY id");
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn list(&self, filter: &UserFilter, paging: Paging) -> Result<Page<User>> {
        let pattern = like_pattern(filter.keyword.as_deref());
        let condition = r#"
            ($1::varchar IS NULL OR role = $1)
            AND ($2::varchar IS NULL OR status = $2)
            AND ($3::text IS NULL OR username ILIKE $3 OR display_name ILIKE $3 OR email ILIKE $3)
        "#;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM users WHERE {condition}"))
            .bind(filter.role)
            .bind(filter.status)
            .bind(&pattern)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {condition} ORDER BY id LIMIT $4 OFFSET $5"
        );
        let items = sqlx::query_as::<_, User>(&sql)
            .bind(filter.role)
            .bind(filter.status)
            .bind(&pattern)
            .bind(paging.limit)
            .bind(paging.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(items, total))
    }

    async fn list_active_by_roles(&self, roles: &[UserRole]) -> Result<Vec<User>> {
        if roles.is_empty() {
            return Ok(vec![]);
        }
        let role_names: Vec<&str> = roles.iter().map(UserRole::as_str).collect();
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role = ANY($1) AND status = $2 ORDER BY id"
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(&role_names)
            .bind(UserStatus::Active)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn create(&self, user: &NewUser) -> Result<User> {
        let sql = format!(
            r#"
            INSERT INTO users (username, password_hash, display_name, email, role, supervisor_id, star_level)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(&user.display_name)
            .bind(&user.email)
            .bind(user.role)
            .bind(user.supervisor_id)
            .bind(user.star_level)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e, "users_username_key") {
                    CrmError::UsernameTaken(user.username.clone())
                } else {
                    CrmError::from(e)
                }
            })
    }

    async fn update(&self, id: i64, update: &UserUpdate) -> Result<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users SET
                display_name = COALESCE($2, display_name),
                email = COALESCE($3, email),
                role = COALESCE($4, role),
                status = COALESCE($5, status),
                supervisor_id = CASE WHEN $6 THEN $7 ELSE supervisor_id END,
                star_level = COALESCE($8, star_level),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(&update.display_name)
            .bind(&update.email)
            .bind(update.role)
            .bind(update.status)
            .bind(update.supervisor_id.is_some())
            .bind(update.supervisor_id.flatten())
            .bind(update.star_level)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn set_password(&self, id: i64, password_hash: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, failed_login_attempts = 0, locked_until = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_login_failure(
        &self,
        id: i64,
        attempts: i32,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET failed_login_attempts = $2, locked_until = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(locked_until)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_login_success(&self, id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET failed_login_attempts = 0, locked_until = NULL, last_login_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upline_chain(&self, user_id: i64, max_depth: usize) -> Result<Vec<User>> {
        // depth 0 为本人；CYCLE 检测防止脏数据造成无限递归
        let columns = qualified(USER_COLUMNS, "u");
        let sql = format!(
            r#"
            WITH RECURSIVE chain AS (
                SELECT id, supervisor_id, 0 AS depth FROM users WHERE id = $1
                UNION ALL
                SELECT u.id, u.supervisor_id, c.depth + 1
                FROM users u
                JOIN chain c ON u.id = c.supervisor_id
                WHERE c.depth < $2
            ) CYCLE id SET is_cycle USING path
            SELECT {columns}
            FROM chain c
            JOIN users u ON u.id = c.id
            WHERE NOT c.is_cycle
            ORDER BY c.depth
            "#
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(max_depth as i32)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }
}
