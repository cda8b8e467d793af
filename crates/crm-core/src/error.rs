//! CRM 业务错误类型
//!
//! 所有业务规则违例都以独立的变体表达，`code()` 给出稳定的机器可读错误码。

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrmError {
    // === 记录不存在 ===
    #[error("用户不存在: {0}")]
    UserNotFound(i64),

    #[error("客户不存在: {0}")]
    ClientNotFound(i64),

    #[error("客户平台不存在: {0}")]
    PlatformNotFound(i64),

    #[error("延期申请不存在: {0}")]
    ExtensionNotFound(i64),

    #[error("奖金池不存在: {0}")]
    BonusPoolNotFound(i64),

    #[error("分润规则不存在: {0}")]
    ProfitShareRuleNotFound(i64),

    #[error("结算单不存在: {0}")]
    SettlementNotFound(i64),

    #[error("待办不存在: {0}")]
    TodoNotFound(i64),

    #[error("通知不存在: {0}")]
    NotificationNotFound(i64),

    #[error("文件不存在: {0}")]
    DocumentNotFound(i64),

    // === 权限与参数 ===
    #[error("无权执行此操作: {0}")]
    Forbidden(String),

    #[error("参数验证失败: {0}")]
    Validation(String),

    #[error("用户名已存在: {0}")]
    UsernameTaken(String),

    #[error("上级关系不能形成环: user_id={user_id}, supervisor_id={supervisor_id}")]
    SupervisorCycle { user_id: i64, supervisor_id: i64 },

    // === 状态流转 ===
    #[error("{entity} 状态不允许此操作: {from} -> {to}")]
    InvalidStatusTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("记录已被并发修改，请刷新后重试")]
    ConcurrentModification,

    #[error("客户提交审核前至少需要登记一个平台")]
    NoPlatforms,

    // === 延期 ===
    #[error("延期次数已达上限: 最多 {max} 次")]
    ExtensionLimitReached { max: i32 },

    #[error("该客户已有待审批的延期申请")]
    ExtensionAlreadyPending,

    #[error("客户当前状态不可申请延期: {0}")]
    ExtensionNotAllowed(String),

    // === 平台验证 ===
    #[error("平台已验证通过，无需再次验证")]
    AlreadyVerified,

    #[error("平台验证已锁定，请联系管理员解锁")]
    VerificationLocked,

    #[error("验证冷却中，请于 {retry_at} 之后重试")]
    VerificationCooldown { retry_at: DateTime<Utc> },

    #[error("该客户已登记此平台: {0}")]
    PlatformAlreadyExists(String),

    // === 结案 ===
    #[error("以下平台余额不为零，无法结案: {}", .platforms.join(", "))]
    OutstandingBalances { platforms: Vec<String> },

    // === 佣金与分润 ===
    #[error("金额无效: {0}")]
    InvalidAmount(String),

    #[error("分润规则无效: {0}")]
    InvalidProfitShareRule(String),

    #[error("分润规则未启用: {0}")]
    ProfitShareRuleInactive(i64),

    #[error("客户未指定分润规则")]
    NoProfitShareRule,

    // === 文件 ===
    #[error("文件过大: 最大 {max_bytes} 字节")]
    FileTooLarge { max_bytes: usize },

    #[error("不支持的文件类型: {0}")]
    UnsupportedFileType(String),

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("存储错误: {0}")]
    Storage(#[from] std::io::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CrmError>;

impl CrmError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::ClientNotFound(_) => "CLIENT_NOT_FOUND",
            Self::PlatformNotFound(_) => "PLATFORM_NOT_FOUND",
            Self::ExtensionNotFound(_) => "EXTENSION_NOT_FOUND",
            Self::BonusPoolNotFound(_) => "BONUS_POOL_NOT_FOUND",
            Self::ProfitShareRuleNotFound(_) => "PROFIT_SHARE_RULE_NOT_FOUND",
            Self::SettlementNotFound(_) => "SETTLEMENT_NOT_FOUND",
            Self::TodoNotFound(_) => "TODO_NOT_FOUND",
            Self::NotificationNotFound(_) => "NOTIFICATION_NOT_FOUND",
            Self::DocumentNotFound(_) => "DOCUMENT_NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::UsernameTaken(_) => "USERNAME_EXISTS",
            Self::SupervisorCycle { .. } => "SUPERVISOR_CYCLE",
            Self::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            Self::ConcurrentModification => "CONCURRENT_MODIFICATION",
            Self::NoPlatforms => "NO_PLATFORMS",
            Self::ExtensionLimitReached { .. } => "EXTENSION_LIMIT_REACHED",
            Self::ExtensionAlreadyPending => "EXTENSION_ALREADY_PENDING",
            Self::ExtensionNotAllowed(_) => "EXTENSION_NOT_ALLOWED",
            Self::AlreadyVerified => "ALREADY_VERIFIED",
            Self::VerificationLocked => "VERIFICATION_LOCKED",
            Self::VerificationCooldown { .. } => "VERIFICATION_COOLDOWN",
            Self::PlatformAlreadyExists(_) => "PLATFORM_EXISTS",
            Self::OutstandingBalances { .. } => "OUTSTANDING_BALANCES",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::InvalidProfitShareRule(_) => "INVALID_PROFIT_SHARE_RULE",
            Self::ProfitShareRuleInactive(_) => "PROFIT_SHARE_RULE_INACTIVE",
            Self::NoProfitShareRule => "NO_PROFIT_SHARE_RULE",
            Self::FileTooLarge { .. } => "FILE_TOO_LARGE",
            Self::UnsupportedFileType(_) => "UNSUPPORTED_FILE_TYPE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 记录不存在类错误
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UserNotFound(_)
                | Self::ClientNotFound(_)
                | Self::PlatformNotFound(_)
                | Self::ExtensionNotFound(_)
                | Self::BonusPoolNotFound(_)
                | Self::ProfitShareRuleNotFound(_)
                | Self::SettlementNotFound(_)
                | Self::TodoNotFound(_)
                | Self::NotificationNotFound(_)
                | Self::DocumentNotFound(_)
        )
    }

    /// 系统错误（非业务规则），对外只返回通用提示
    pub fn is_system_error(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Serialization(_) | Self::Storage(_) | Self::Internal(_)
        )
    }

    /// 附加数据，随错误响应一并返回给调用方
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::VerificationCooldown { retry_at } => {
                Some(serde_json::json!({ "retryAt": retry_at }))
            }
            Self::OutstandingBalances { platforms } => {
                Some(serde_json::json!({ "platforms": platforms }))
            }
            Self::ExtensionLimitReached { max } => Some(serde_json::json!({ "max": max })),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let cases: Vec<(CrmError, &str)> = vec![
            (CrmError::ClientNotFound(1), "CLIENT_NOT_FOUND"),
            (CrmError::ExtensionLimitReached { max: 3 }, "EXTENSION_LIMIT_REACHED"),
            (CrmError::ExtensionAlreadyPending, "EXTENSION_ALREADY_PENDING"),
            (
                CrmError::VerificationCooldown { retry_at: Utc::now() },
                "VERIFICATION_COOLDOWN",
            ),
            (
                CrmError::OutstandingBalances { platforms: vec!["betmgm".into()] },
                "OUTSTANDING_BALANCES",
            ),
            (CrmError::NoProfitShareRule, "NO_PROFIT_SHARE_RULE"),
            (CrmError::Database(sqlx::Error::PoolTimedOut), "DATABASE_ERROR"),
        ];

        for (err, code) in cases {
            assert_eq!(err.code(), code, "{err}");
        }
    }

    #[test]
    fn test_classification() {
        assert!(CrmError::TodoNotFound(9).is_not_found());
        assert!(!CrmError::NoPlatforms.is_not_found());
        assert!(CrmError::Internal("x".into()).is_system_error());
        assert!(!CrmError::VerificationLocked.is_system_error());
    }

    #[test]
    fn test_outstanding_balances_message_lists_platforms() {
        let err = CrmError::OutstandingBalances {
            platforms: vec!["betmgm".to_string(), "fanduel".to_string()],
        };
        assert!(err.to_string().contains("betmgm, fanduel"));
        assert_eq!(err.details().unwrap()["platforms"][1], "fanduel");
    }
}
