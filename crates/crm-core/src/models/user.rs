//! 用户与会话身份

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::client::Client;
use super::enums::{UserRole, UserStatus};

/// 系统用户（业务员或后台员工）
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub email: Option<String>,
    pub role: UserRole,
    pub status: UserStatus,
    /// 直属上级，用于星级奖金的链路分配
    pub supervisor_id: Option<i64>,
    /// 星级 0..=5，0 表示不参与星级奖金
    pub star_level: i32,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 登录前置检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginGate {
    Allowed,
    Disabled,
    Locked(DateTime<Utc>),
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.id,
            role: self.role,
            name: self.display_name.clone(),
        }
    }

    /// 登录前检查账户是否可用
    pub fn login_gate(&self, now: DateTime<Utc>) -> LoginGate {
        if self.status == UserStatus::Disabled {
            return LoginGate::Disabled;
        }
        match self.locked_until {
            Some(until) if until > now => LoginGate::Locked(until),
            _ => LoginGate::Allowed,
        }
    }

    /// 计算一次密码错误后的失败次数与锁定时间
    ///
    /// 上一次锁定已过期时从零重新计数。
    pub fn after_failed_login(
        &self,
        now: DateTime<Utc>,
        threshold: i32,
        lockout_minutes: i64,
    ) -> (i32, Option<DateTime<Utc>>) {
        let previous = match self.locked_until {
            Some(until) if until <= now => 0,
            _ => self.failed_login_attempts,
        };
        let attempts = previous + 1;
        if attempts >= threshold {
            (attempts, Some(now + Duration::minutes(lockout_minutes)))
        } else {
            (attempts, None)
        }
    }
}

/// 当前请求的操作者，由 JWT Claims 还原
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: i64,
    pub role: UserRole,
    pub name: String,
}

impl Actor {
    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// 业务员只能访问自己名下的客户，后台员工可访问全部
    pub fn can_access_client(&self, client: &Client) -> bool {
        self.is_staff() || client.agent_id == self.user_id
    }

    /// 列表查询时业务员强制限定为本人
    pub fn agent_scope(&self) -> Option<i64> {
        if self.is_staff() { None } else { Some(self.user_id) }
    }
}

/// 新建用户
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub display_name: String,
    pub email: Option<String>,
    pub role: UserRole,
    pub supervisor_id: Option<i64>,
    pub star_level: i32,
}

/// 用户资料更新，None 表示不修改
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
    /// Some(None) 表示清除上级
    pub supervisor_id: Option<Option<i64>>,
    pub star_level: Option<i32>,
}

/// 用户列表过滤条件
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
    pub keyword: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_fixtures::{client_for_agent, user_with_role};

    #[test]
    fn test_login_gate() {
        let now = Utc::now();
        let mut user = user_with_role(1, UserRole::Agent);
        assert_eq!(user.login_gate(now), LoginGate::Allowed);

        user.locked_until = Some(now + Duration::minutes(5));
        assert!(matches!(user.login_gate(now), LoginGate::Locked(_)));

        user.locked_until = Some(now - Duration::minutes(1));
        assert_eq!(user.login_gate(now), LoginGate::Allowed);

        user.status = UserStatus::Disabled;
        assert_eq!(user.login_gate(now), LoginGate::Disabled);
    }

    #[test]
    fn test_lockout_after_threshold() {
        let now = Utc::now();
        let mut user = user_with_role(1, UserRole::Agent);

        user.failed_login_attempts = 3;
        assert_eq!(user.after_failed_login(now, 5, 30), (4, None));

        user.failed_login_attempts = 4;
        let (attempts, locked) = user.after_failed_login(now, 5, 30);
        assert_eq!(attempts, 5);
        assert_eq!(locked, Some(now + Duration::minutes(30)));
    }

    #[test]
    fn test_expired_lock_restarts_failure_count() {
        let now = Utc::now();
        let mut user = user_with_role(1, UserRole::Agent);
        user.failed_login_attempts = 5;
        user.locked_until = Some(now - Duration::minutes(1));

        assert_eq!(user.login_gate(now), LoginGate::Allowed);
        assert_eq!(user.after_failed_login(now, 5, 30), (1, None));

        user.locked_until = Some(now);
        assert_eq!(user.after_failed_login(now, 5, 30), (1, None));
    }

    #[test]
    fn test_client_visibility() {
        let agent = user_with_role(7, UserRole::Agent).actor();
        let other = user_with_role(8, UserRole::Agent).actor();
        let staff = user_with_role(9, UserRole::Backoffice).actor();
        let client = client_for_agent(100, 7);

        assert!(agent.can_access_client(&client));
        assert!(!other.can_access_client(&client));
        assert!(staff.can_access_client(&client));
        assert_eq!(agent.agent_scope(), Some(7));
        assert_eq!(staff.agent_scope(), None);
    }
}
