//! 待办事项

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::enums::TodoStatus;

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: i64,
    pub client_id: Option<i64>,
    pub due_at: Option<DateTime<Utc>>,
    pub status: TodoStatus,
    /// 系统生成的待办为空
    pub created_by: Option<i64>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Todo {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == TodoStatus::Open && self.due_at.is_some_and(|due| due < now)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTodo {
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: i64,
    pub client_id: Option<i64>,
    pub due_at: Option<DateTime<Utc>>,
    pub created_by: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct TodoFilter {
    pub assignee_id: Option<i64>,
    pub client_id: Option<i64>,
    pub status: Option<TodoStatus>,
    pub overdue_only: bool,
}
