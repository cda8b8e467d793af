//! 客户事件日志（只追加）

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::enums::EventType;

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLog {
    pub id: i64,
    pub client_id: Option<i64>,
    pub actor_id: Option<i64>,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// 与业务写入同事务落库的事件
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub client_id: Option<i64>,
    pub actor_id: Option<i64>,
    pub event_type: EventType,
    pub payload: serde_json::Value,
}

impl NewEvent {
    pub fn client(client_id: i64, actor_id: i64, event_type: EventType) -> Self {
        Self {
            client_id: Some(client_id),
            actor_id: Some(actor_id),
            event_type,
            payload: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}
