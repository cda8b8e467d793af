//! 用户服务：业务员与后台员工的账户管理

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use super::{ensure_admin, required_text};
use crate::error::{CrmError, Result};
use crate::models::{Actor, NewUser, Page, Paging, User, UserFilter, UserRole, UserUpdate};
use crate::repository::UserRepositoryTrait;

const MAX_STAR_LEVEL: i32 = 5;
/// 校验上级环时最多向上追溯的层数
const MAX_CHAIN_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub struct CreateUserInput {
    pub username: String,
    /// 已哈希的密码，明文不进入业务层
    pub password_hash: String,
    pub display_name: String,
    pub email: Option<String>,
    pub role: UserRole,
    pub supervisor_id: Option<i64>,
    pub star_level: i32,
}

pub struct UserService {
    users: Arc<dyn UserRepositoryTrait>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepositoryTrait>) -> Self {
        Self { users }
    }

    #[instrument(skip(self, input), fields(actor = actor.user_id, username = %input.username))]
    pub async fn create(&self, actor: &Actor, input: CreateUserInput) -> Result<User> {
        ensure_admin(actor)?;

        let username = input.username.trim().to_ascii_lowercase();
        validate_username(&username)?;
        validate_star_level(input.star_level)?;
        if let Some(supervisor_id) = input.supervisor_id {
            self.ensure_supervisor(supervisor_id).await?;
        }

        let user = self
            .users
            .create(&NewUser {
                username,
                password_hash: input.password_hash,
                display_name: required_text(&input.display_name, "显示名称")?,
                email: input.email,
                role: input.role,
                supervisor_id: input.supervisor_id,
                star_level: input.star_level,
            })
            .await?;

        info!(user_id = user.id, role = user.role.as_str(), "用户创建成功");
        Ok(user)
    }

    /// 后台员工可查看任意用户，业务员只能查看自己
    pub async fn get(&self, actor: &Actor, id: i64) -> Result<User> {
        if !actor.is_staff() && actor.user_id != id {
            return Err(CrmError::UserNotFound(id));
        }
        self.users.get(id).await?.ok_or(CrmError::UserNotFound(id))
    }

    pub async fn list(&self, actor: &Actor, filter: UserFilter, paging: Paging) -> Result<Page<User>> {
        super::ensure_staff(actor)?;
        self.users.list(&filter, paging).await
    }

    #[instrument(skip(self, update), fields(actor = actor.user_id))]
    pub async fn update(&self, actor: &Actor, id: i64, mut update: UserUpdate) -> Result<User> {
        ensure_admin(actor)?;
        let current = self.users.get(id).await?.ok_or(CrmError::UserNotFound(id))?;

        if let Some(name) = &update.display_name {
            update.display_name = Some(required_text(name, "显示名称")?);
        }
        if let Some(level) = update.star_level {
            validate_star_level(level)?;
        }
        if actor.user_id == id && update.status.is_some_and(|s| s != current.status) {
            return Err(CrmError::Forbidden("不能修改自己的账户状态".to_string()));
        }
        if actor.user_id == id && update.role.is_some_and(|r| r != current.role) {
            return Err(CrmError::Forbidden("不能修改自己的角色".to_string()));
        }
        if let Some(Some(supervisor_id)) = update.supervisor_id {
            self.ensure_no_cycle(id, supervisor_id).await?;
        }

        let updated = self
            .users
            .update(id, &update)
            .await?
            .ok_or(CrmError::UserNotFound(id))?;
        info!(user_id = id, "用户资料已更新");
        Ok(updated)
    }

    /// 管理员重置他人密码，或用户修改自己的密码
    pub async fn set_password(&self, actor: &Actor, id: i64, password_hash: &str) -> Result<()> {
        if actor.user_id != id {
            ensure_admin(actor)?;
        }
        if !self.users.set_password(id, password_hash).await? {
            return Err(CrmError::UserNotFound(id));
        }
        info!(user_id = id, by = actor.user_id, "密码已更新");
        Ok(())
    }

    /// 登录用，按用户名查找（不区分大小写）
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        self.users
            .get_by_username(&username.trim().to_ascii_lowercase())
            .await
    }

    /// 记录一次密码错误，达到阈值后锁定
    pub async fn record_login_failure(
        &self,
        user: &User,
        now: DateTime<Utc>,
        threshold: i32,
        lockout_minutes: i64,
    ) -> Result<Option<DateTime<Utc>>> {
        let (attempts, locked_until) = user.after_failed_login(now, threshold, lockout_minutes);
        self.users
            .record_login_failure(user.id, attempts, locked_until)
            .await?;
        if let Some(until) = locked_until {
            warn!(user_id = user.id, %until, "连续登录失败，账户已锁定");
        }
        Ok(locked_until)
    }

    /// 系统中还没有管理员时创建初始管理员，已存在则返回 None
    pub async fn bootstrap_admin(&self, username: &str, password_hash: &str) -> Result<Option<User>> {
        let filter = UserFilter {
            role: Some(UserRole::Admin),
            ..Default::default()
        };
        if self.users.list(&filter, Paging::new(1, 1)).await?.total > 0 {
            return Ok(None);
        }

        let username = username.trim().to_ascii_lowercase();
        validate_username(&username)?;
        let user = self
            .users
            .create(&NewUser {
                username,
                password_hash: password_hash.to_string(),
                display_name: "系统管理员".to_string(),
                email: None,
                role: UserRole::Admin,
                supervisor_id: None,
                star_level: 0,
            })
            .await?;
        info!(user_id = user.id, username = %user.username, "初始管理员已创建");
        Ok(Some(user))
    }

    pub async fn record_login_success(&self, user_id: i64) -> Result<()> {
        self.users.record_login_success(user_id).await
    }

    async fn ensure_supervisor(&self, supervisor_id: i64) -> Result<User> {
        let supervisor = self
            .users
            .get(supervisor_id)
            .await?
            .ok_or(CrmError::UserNotFound(supervisor_id))?;
        if supervisor.role != UserRole::Agent {
            return Err(CrmError::Validation("上级必须是业务员".to_string()));
        }
        Ok(supervisor)
    }

    /// 新上级的上级链中不能出现本人
    async fn ensure_no_cycle(&self, user_id: i64, supervisor_id: i64) -> Result<()> {
        let cycle = CrmError::SupervisorCycle {
            user_id,
            supervisor_id,
        };
        if user_id == supervisor_id {
            return Err(cycle);
        }
        self.ensure_supervisor(supervisor_id).await?;

        let chain = self.users.upline_chain(supervisor_id, MAX_CHAIN_DEPTH).await?;
        if chain.iter().any(|u| u.id == user_id) {
            return Err(cycle);
        }
        Ok(())
    }
}

fn validate_username(username: &str) -> Result<()> {
    let valid_len = (3..=50).contains(&username.len());
    let valid_chars = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid_len && valid_chars {
        Ok(())
    } else {
        Err(CrmError::Validation(
            "用户名须为 3-50 位字母、数字或 _.-".to_string(),
        ))
    }
}

fn validate_star_level(level: i32) -> Result<()> {
    if (0..=MAX_STAR_LEVEL).contains(&level) {
        Ok(())
    } else {
        Err(CrmError::Validation(format!(
            "星级必须在 0-{MAX_STAR_LEVEL} 之间"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserStatus;
    use crate::models::test_fixtures::{agent, user_with_role};
    use crate::repository::MockUserRepositoryTrait;

    fn admin() -> Actor {
        user_with_role(1, UserRole::Admin).actor()
    }

    fn input() -> CreateUserInput {
        CreateUserInput {
            username: "  New.Agent ".to_string(),
            password_hash: "$2b$hash".to_string(),
            display_name: "新业务员".to_string(),
            email: None,
            role: UserRole::Agent,
            supervisor_id: None,
            star_level: 1,
        }
    }

    #[tokio::test]
    async fn test_create_normalizes_username() {
        let mut repo = MockUserRepositoryTrait::new();
        repo.expect_create()
            .withf(|u| u.username == "new.agent" && u.star_level == 1)
            .returning(|u| {
                let mut user = agent(10, u.star_level, None);
                user.username = u.username.clone();
                Ok(user)
            });

        let service = UserService::new(Arc::new(repo));
        let user = service.create(&admin(), input()).await.unwrap();
        assert_eq!(user.username, "new.agent");
    }

    #[tokio::test]
    async fn test_bootstrap_admin_only_when_missing() {
        let mut repo = MockUserRepositoryTrait::new();
        repo.expect_list()
            .withf(|f, _| f.role == Some(UserRole::Admin))
            .times(1)
            .returning(|_, _| Ok(Page::new(vec![], 0)));
        repo.expect_create()
            .withf(|u| u.role == UserRole::Admin && u.username == "admin")
            .times(1)
            .returning(|u| {
                let mut user = user_with_role(1, u.role);
                user.username = u.username.clone();
                Ok(user)
            });
        let service = UserService::new(Arc::new(repo));
        let created = service.bootstrap_admin(" Admin ", "$2b$hash").await.unwrap();
        assert_eq!(created.map(|u| u.username), Some("admin".to_string()));

        let mut repo = MockUserRepositoryTrait::new();
        repo.expect_list()
            .returning(|_, _| Ok(Page::new(vec![user_with_role(1, UserRole::Admin)], 1)));
        let service = UserService::new(Arc::new(repo));
        assert!(service.bootstrap_admin("admin", "$2b$hash").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_only_admin_creates_users() {
        let service = UserService::new(Arc::new(MockUserRepositoryTrait::new()));
        let backoffice = user_with_role(2, UserRole::Backoffice).actor();
        let err = service.create(&backoffice, input()).await.unwrap_err();
        assert!(matches!(err, CrmError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_create_validates_fields() {
        let service = UserService::new(Arc::new(MockUserRepositoryTrait::new()));

        let bad_name = CreateUserInput {
            username: "a b".to_string(),
            ..input()
        };
        assert!(matches!(
            service.create(&admin(), bad_name).await,
            Err(CrmError::Validation(_))
        ));

        let bad_star = CreateUserInput {
            star_level: 6,
            ..input()
        };
        assert!(matches!(
            service.create(&admin(), bad_star).await,
            Err(CrmError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_supervisor_cycle_rejected() {
        // 3 的上级是 2，2 的上级是 1；把 1 的上级设为 3 会成环
        let mut repo = MockUserRepositoryTrait::new();
        repo.expect_get().returning(|id| Ok(Some(agent(id, 1, None))));
        repo.expect_upline_chain().returning(|id, _| {
            Ok(vec![agent(id, 1, Some(2)), agent(2, 2, Some(1)), agent(1, 3, None)])
        });
        repo.expect_update().never();

        let service = UserService::new(Arc::new(repo));
        let update = UserUpdate {
            supervisor_id: Some(Some(3)),
            ..Default::default()
        };
        let err = service.update(&admin(), 1, update).await.unwrap_err();
        assert!(matches!(
            err,
            CrmError::SupervisorCycle {
                user_id: 1,
                supervisor_id: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_self_supervisor_rejected() {
        let mut repo = MockUserRepositoryTrait::new();
        repo.expect_get().returning(|id| Ok(Some(agent(id, 1, None))));
        let service = UserService::new(Arc::new(repo));

        let update = UserUpdate {
            supervisor_id: Some(Some(5)),
            ..Default::default()
        };
        let err = service.update(&admin(), 5, update).await.unwrap_err();
        assert_eq!(err.code(), "SUPERVISOR_CYCLE");
    }

    #[tokio::test]
    async fn test_admin_cannot_disable_self() {
        let mut repo = MockUserRepositoryTrait::new();
        repo.expect_get()
            .returning(|id| Ok(Some(user_with_role(id, UserRole::Admin))));
        let service = UserService::new(Arc::new(repo));

        let update = UserUpdate {
            status: Some(UserStatus::Disabled),
            ..Default::default()
        };
        let err = service.update(&admin(), 1, update).await.unwrap_err();
        assert!(matches!(err, CrmError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_agent_sees_only_self() {
        let mut repo = MockUserRepositoryTrait::new();
        repo.expect_get().returning(|id| Ok(Some(agent(id, 0, None))));
        let service = UserService::new(Arc::new(repo));
        let actor = agent(7, 0, None).actor();

        assert!(service.get(&actor, 7).await.is_ok());
        assert!(matches!(
            service.get(&actor, 8).await,
            Err(CrmError::UserNotFound(8))
        ));
    }

    #[tokio::test]
    async fn test_login_failure_locks_at_threshold() {
        let mut repo = MockUserRepositoryTrait::new();
        repo.expect_record_login_failure()
            .withf(|id, attempts, locked| *id == 7 && *attempts == 5 && locked.is_some())
            .times(1)
            .returning(|_, _, _| Ok(()));
        let service = UserService::new(Arc::new(repo));

        let mut user = agent(7, 0, None);
        user.failed_login_attempts = 4;
        let locked = service
            .record_login_failure(&user, Utc::now(), 5, 30)
            .await
            .unwrap();
        assert!(locked.is_some());
    }
}
