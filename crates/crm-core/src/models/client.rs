//! 客户

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::enums::ClientStatus;

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: i64,
    /// 负责该客户的业务员
    pub agent_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// 所在州（两位州代码）
    pub state: Option<String>,
    pub notes: Option<String>,
    pub status: ClientStatus,
    /// 最近一次退回或拒绝时填写的说明
    pub status_note: Option<String>,
    pub intake_deadline: DateTime<Utc>,
    pub extension_count: i32,
    pub profit_share_rule_id: Option<i64>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// 入驻期限已过但仍未完成入驻
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status.is_intake_phase() && self.intake_deadline < now
    }
}

#[derive(Debug, Clone)]
pub struct NewClient {
    pub agent_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub state: Option<String>,
    pub notes: Option<String>,
    pub intake_deadline: DateTime<Utc>,
}

/// 客户联系信息更新，None 表示不修改
#[derive(Debug, Clone, Default)]
pub struct ClientUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub state: Option<String>,
    pub notes: Option<String>,
}

impl ClientUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.state.is_none()
            && self.notes.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientFilter {
    pub status: Option<ClientStatus>,
    pub agent_id: Option<i64>,
    pub keyword: Option<String>,
    /// 只看入驻期限已过的客户
    pub overdue_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_fixtures::client_for_agent;
    use chrono::Duration;

    #[test]
    fn test_overdue_only_in_intake_phase() {
        let now = Utc::now();
        let mut client = client_for_agent(1, 2);
        client.intake_deadline = now - Duration::days(1);

        client.status = ClientStatus::Intake;
        assert!(client.is_overdue(now));
        client.status = ClientStatus::PendingReview;
        assert!(client.is_overdue(now));
        client.status = ClientStatus::Active;
        assert!(!client.is_overdue(now));

        client.status = ClientStatus::Intake;
        client.intake_deadline = now + Duration::days(1);
        assert!(!client.is_overdue(now));
    }

    #[test]
    fn test_update_is_empty() {
        assert!(ClientUpdate::default().is_empty());
        let update = ClientUpdate {
            phone: Some("555-0100".into()),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
