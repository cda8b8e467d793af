//! 站内通知

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::enums::NotificationKind;

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub client_id: Option<i64>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// 通知内容，扇出时复制给每个收件人
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationDraft {
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub client_id: Option<i64>,
}

impl NotificationDraft {
    pub fn new(kind: NotificationKind, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            body: body.into(),
            client_id: None,
        }
    }

    pub fn for_client(mut self, client_id: i64) -> Self {
        self.client_id = Some(client_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: i64,
    pub draft: NotificationDraft,
}
