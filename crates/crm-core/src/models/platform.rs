//! 客户平台账户与验证

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::enums::{PlatformKind, VerificationStatus};

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPlatform {
    pub id: i64,
    pub client_id: i64,
    pub kind: PlatformKind,
    /// 平台侧账户标识
    pub account_ref: Option<String>,
    pub status: VerificationStatus,
    /// 累计失败次数
    pub attempts: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub balance: Decimal,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPlatform {
    pub client_id: i64,
    pub kind: PlatformKind,
    pub account_ref: Option<String>,
}

/// 一次验证尝试的结果
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationOutcome {
    Success,
    Failure { note: Option<String> },
}

impl VerificationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure { .. } => "failure",
        }
    }
}

/// 验证尝试后的平台状态，由仓储以乐观锁方式写入
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptUpdate {
    pub platform_id: i64,
    /// 读取时的失败次数，写入时作为并发校验条件
    pub expected_attempts: i32,
    pub status: VerificationStatus,
    pub attempts: i32,
    pub attempted_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}
