//! 仓储层
//!
//! PostgreSQL 实现与对应的 Trait 定义。

mod bonus_repo;
mod client_repo;
mod document_repo;
mod event_log_repo;
mod extension_repo;
mod notification_repo;
mod platform_repo;
mod profit_share_repo;
mod todo_repo;
mod traits;
mod user_repo;

pub use bonus_repo::BonusRepository;
pub use client_repo::ClientRepository;
pub use document_repo::DocumentRepository;
pub use event_log_repo::EventLogRepository;
pub use extension_repo::ExtensionRepository;
pub use notification_repo::NotificationRepository;
pub use platform_repo::PlatformRepository;
pub use profit_share_repo::ProfitShareRepository;
pub use todo_repo::TodoRepository;
pub use traits::*;
pub use user_repo::UserRepository;

#[cfg(test)]
pub use traits::{
    MockBonusRepositoryTrait, MockClientRepositoryTrait, MockDocumentRepositoryTrait,
    MockEventLogRepositoryTrait, MockExtensionRepositoryTrait, MockNotificationRepositoryTrait,
    MockPlatformRepositoryTrait, MockProfitShareRepositoryTrait, MockTodoRepositoryTrait,
    MockUserRepositoryTrait,
};

use sqlx::PgConnection;

use crate::error::Result;
use crate::models::{NewEvent, NewTodo, Todo};

pub(crate) const TODO_COLUMNS: &str = "id, title, description, assignee_id, client_id, due_at, \
     status, created_by, completed_at, created_at, updated_at";

/// 在当前事务中追加一条事件日志
pub(crate) async fn insert_event(conn: &mut PgConnection, event: &NewEvent) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO event_logs (client_id, actor_id, event_type, payload)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(event.client_id)
    .bind(event.actor_id)
    .bind(event.event_type)
    .bind(&event.payload)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// 在当前事务中创建待办
pub(crate) async fn insert_todo(conn: &mut PgConnection, todo: &NewTodo) -> Result<Todo> {
    let sql = format!(
        r#"
        INSERT INTO todos (title, description, assignee_id, client_id, due_at, created_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {TODO_COLUMNS}
        "#
    );
    let created = sqlx::query_as::<_, Todo>(&sql)
        .bind(&todo.title)
        .bind(&todo.description)
        .bind(todo.assignee_id)
        .bind(todo.client_id)
        .bind(todo.due_at)
        .bind(todo.created_by)
        .fetch_one(&mut *conn)
        .await?;

    Ok(created)
}

/// 是否为指定约束上的唯一性冲突
pub(crate) fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.is_unique_violation() && db.constraint().is_some_and(|c| c == constraint)
        }
        _ => false,
    }
}

/// 给列清单加上表别名前缀，用于 JOIN 查询
pub(crate) fn qualified(columns: &str, alias: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// 构造 ILIKE 模式，转义用户输入中的通配符
pub(crate) fn like_pattern(keyword: Option<&str>) -> Option<String> {
    keyword
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|k| {
            let escaped = k
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            format!("%{escaped}%")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_columns() {
        assert_eq!(qualified("id, name,\n status", "u"), "u.id, u.name, u.status");
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(Some("ann")), Some("%ann%".to_string()));
        assert_eq!(like_pattern(Some(" 50%_off ")), Some("%50\\%\\_off%".to_string()));
        assert_eq!(like_pattern(Some("   ")), None);
        assert_eq!(like_pattern(None), None);
    }
}
