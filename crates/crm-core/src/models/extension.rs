//! 入驻期限延期申请

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::enums::ExtensionStatus;

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionRequest {
    pub id: i64,
    pub client_id: i64,
    pub requested_by: i64,
    pub requested_days: i32,
    pub reason: String,
    pub status: ExtensionStatus,
    pub reviewed_by: Option<i64>,
    pub review_note: Option<String>,
    /// 审批通过时记录的原期限与新期限
    pub previous_deadline: Option<DateTime<Utc>>,
    pub new_deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewExtensionRequest {
    pub client_id: i64,
    pub requested_by: i64,
    pub requested_days: i32,
    pub reason: String,
}

/// 审批通过时一次性写入申请与客户的参数
#[derive(Debug, Clone)]
pub struct ExtensionApproval {
    pub request_id: i64,
    pub client_id: i64,
    pub reviewer_id: i64,
    pub note: Option<String>,
    pub previous_deadline: DateTime<Utc>,
    pub new_deadline: DateTime<Utc>,
    /// 写入时再次校验延期次数上限
    pub max_extensions: i32,
}

#[derive(Debug, Clone, Default)]
pub struct ExtensionFilter {
    pub client_id: Option<i64>,
    pub status: Option<ExtensionStatus>,
    /// 业务员只能看到自己名下客户的申请
    pub agent_id: Option<i64>,
}
