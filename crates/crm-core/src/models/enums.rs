//! CRM 枚举类型定义
//!
//! 数据库中以 varchar 存储（snake_case），JSON 中使用 SCREAMING_SNAKE_CASE。

use serde::{Deserialize, Serialize};

/// 用户角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum UserRole {
    /// 一线业务员，只能处理自己名下的客户
    Agent,
    /// 后台运营，负责审核、验证与对账
    Backoffice,
    /// 管理员，拥有后台全部权限并管理用户与分润规则
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Backoffice => "backoffice",
            Self::Admin => "admin",
        }
    }

    /// 后台员工（Backoffice 与 Admin）
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Backoffice | Self::Admin)
    }

    /// 后台角色组，用于通知扇出
    pub const STAFF: [UserRole; 2] = [UserRole::Backoffice, UserRole::Admin];
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "agent" => Ok(Self::Agent),
            "backoffice" => Ok(Self::Backoffice),
            "admin" => Ok(Self::Admin),
            other => Err(format!("未知角色: {other}")),
        }
    }
}

/// 用户状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum UserStatus {
    #[default]
    Active,
    Disabled,
}

/// 客户状态
///
/// 入驻阶段：Intake -> PendingReview -> Active，审核可退回 Intake 或直接拒绝；
/// Active 客户通过结案进入 Closed。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum ClientStatus {
    #[default]
    Intake,
    PendingReview,
    Active,
    Closed,
    Rejected,
}

impl ClientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::PendingReview => "pending_review",
            Self::Active => "active",
            Self::Closed => "closed",
            Self::Rejected => "rejected",
        }
    }

    pub fn can_transition_to(&self, to: ClientStatus) -> bool {
        use ClientStatus::*;
        matches!(
            (self, to),
            (Intake, PendingReview)
                | (PendingReview, Active)
                | (PendingReview, Intake)
                | (Intake, Rejected)
                | (PendingReview, Rejected)
                | (Active, Closed)
        )
    }

    /// 仍处于入驻阶段（受期限约束，可申请延期）
    pub fn is_intake_phase(&self) -> bool {
        matches!(self, Self::Intake | Self::PendingReview)
    }

    /// 终态客户不再接受任何修改
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Rejected)
    }
}

/// 平台类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum PlatformKind {
    Betmgm,
    Draftkings,
    Fanduel,
    Caesars,
    Bank,
    Other,
}

impl PlatformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Betmgm => "betmgm",
            Self::Draftkings => "draftkings",
            Self::Fanduel => "fanduel",
            Self::Caesars => "caesars",
            Self::Bank => "bank",
            Self::Other => "other",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Betmgm => "BetMGM",
            Self::Draftkings => "DraftKings",
            Self::Fanduel => "FanDuel",
            Self::Caesars => "Caesars",
            Self::Bank => "Bank",
            Self::Other => "Other",
        }
    }

    /// 只有 BetMGM 有验证冷却和次数上限
    pub fn has_verification_limits(&self) -> bool {
        matches!(self, Self::Betmgm)
    }
}

/// 平台验证状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    NotStarted,
    Pending,
    Verified,
    Failed,
    Locked,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Failed => "failed",
            Self::Locked => "locked",
        }
    }
}

/// 延期申请状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum ExtensionStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ExtensionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// 奖金池状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum PoolStatus {
    #[default]
    Draft,
    Allocated,
    Settled,
}

impl PoolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Allocated => "allocated",
            Self::Settled => "settled",
        }
    }
}

/// 奖金分配类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum AllocationKind {
    /// 成交业务员的直接奖金
    Direct,
    /// 按星级在成交链路上分配的部分
    Star,
    /// 无人符合星级条件时归公司
    House,
}

impl AllocationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Star => "star",
            Self::House => "house",
        }
    }
}

/// 结算单状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum SettlementStatus {
    #[default]
    Pending,
    Confirmed,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
        }
    }
}

/// 待办状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Open,
    Done,
    Cancelled,
}

impl TodoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }
}

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum NotificationKind {
    ClientSubmitted,
    ClientApproved,
    ClientReturned,
    ClientRejected,
    ClientClosed,
    ClientAssigned,
    ExtensionRequested,
    ExtensionApproved,
    ExtensionRejected,
    VerificationRequested,
    VerificationSucceeded,
    VerificationFailed,
    VerificationLocked,
    BonusSettled,
    SettlementConfirmed,
    TodoAssigned,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientSubmitted => "client_submitted",
            Self::ClientApproved => "client_approved",
            Self::ClientReturned => "client_returned",
            Self::ClientRejected => "client_rejected",
            Self::ClientClosed => "client_closed",
            Self::ClientAssigned => "client_assigned",
            Self::ExtensionRequested => "extension_requested",
            Self::ExtensionApproved => "extension_approved",
            Self::ExtensionRejected => "extension_rejected",
            Self::VerificationRequested => "verification_requested",
            Self::VerificationSucceeded => "verification_succeeded",
            Self::VerificationFailed => "verification_failed",
            Self::VerificationLocked => "verification_locked",
            Self::BonusSettled => "bonus_settled",
            Self::SettlementConfirmed => "settlement_confirmed",
            Self::TodoAssigned => "todo_assigned",
        }
    }
}

/// 客户事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum EventType {
    ClientCreated,
    ClientUpdated,
    ClientSubmitted,
    ClientApproved,
    ClientReturned,
    ClientRejected,
    ClientClosed,
    AgentAssigned,
    ProfitShareRuleAssigned,
    PlatformAdded,
    VerificationRequested,
    VerificationAttempted,
    PlatformUnlocked,
    BalanceUpdated,
    ExtensionRequested,
    ExtensionApproved,
    ExtensionRejected,
    BonusPoolCreated,
    BonusAllocated,
    BonusSettled,
    SettlementCreated,
    SettlementConfirmed,
    DocumentUploaded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_transitions() {
        use ClientStatus::*;
        let allowed = [
            (Intake, PendingReview),
            (PendingReview, Active),
            (PendingReview, Intake),
            (Intake, Rejected),
            (PendingReview, Rejected),
            (Active, Closed),
        ];
        let all = [Intake, PendingReview, Active, Closed, Rejected];

        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{:?} -> {:?}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("ADMIN".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert_eq!("agent".parse::<UserRole>().unwrap(), UserRole::Agent);
        assert!("root".parse::<UserRole>().is_err());
        assert!(UserRole::Backoffice.is_staff());
        assert!(!UserRole::Agent.is_staff());
    }

    #[test]
    fn test_json_representation() {
        let json = serde_json::to_string(&ClientStatus::PendingReview).unwrap();
        assert_eq!(json, "\"PENDING_REVIEW\"");
        let kind: PlatformKind = serde_json::from_str("\"BETMGM\"").unwrap();
        assert!(kind.has_verification_limits());
        assert!(!PlatformKind::Fanduel.has_verification_limits());
    }
}
