//! 客户服务
//!
//! 客户建档、资料维护与入驻阶段流转：
//! Intake -> PendingReview -> Active，审核可退回 Intake 或拒绝。
//! 结案见 [`super::ClosureService`]。

use std::sync::Arc;

use chrono::{Duration, Utc};
use crm_shared::config::BusinessConfig;
use crm_shared::observability::metrics;
use serde_json::json;
use tracing::{info, instrument};

use super::{ensure_staff, load_client, required_text};
use crate::error::{CrmError, Result};
use crate::models::{
    Actor, Client, ClientFilter, ClientStatus, ClientUpdate, EventLog, EventType, NewClient,
    NewEvent, NewTodo, NotificationDraft, NotificationKind, Page, Paging, UserRole,
};
use crate::repository::{
    ClientRepositoryTrait, ClientTransition, EventLogRepositoryTrait, PlatformRepositoryTrait,
    ProfitShareRepositoryTrait, UserRepositoryTrait,
};
use crate::service::NotificationService;

/// 关键字搜索的最短长度
pub const MIN_SEARCH_LEN: usize = 2;
const MAX_SEARCH_LEN: usize = 100;
const MAX_SEARCH_LIMIT: i64 = 50;
const MAX_EXPORT_ROWS: i64 = 10_000;

#[derive(Debug, Clone)]
pub struct CreateClientInput {
    /// 后台员工可指定业务员，业务员只能为自己建档
    pub agent_id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub state: Option<String>,
    pub notes: Option<String>,
}

pub struct ClientService {
    clients: Arc<dyn ClientRepositoryTrait>,
    platforms: Arc<dyn PlatformRepositoryTrait>,
    users: Arc<dyn UserRepositoryTrait>,
    rules: Arc<dyn ProfitShareRepositoryTrait>,
    events: Arc<dyn EventLogRepositoryTrait>,
    notifier: Arc<NotificationService>,
    config: BusinessConfig,
}

impl ClientService {
    pub fn new(
        clients: Arc<dyn ClientRepositoryTrait>,
        platforms: Arc<dyn PlatformRepositoryTrait>,
        users: Arc<dyn UserRepositoryTrait>,
        rules: Arc<dyn ProfitShareRepositoryTrait>,
        events: Arc<dyn EventLogRepositoryTrait>,
        notifier: Arc<NotificationService>,
        config: BusinessConfig,
    ) -> Self {
        Self {
            clients,
            platforms,
            users,
            rules,
            events,
            notifier,
            config,
        }
    }

    /// 新建客户，入驻期限从当前时间起算
    #[instrument(skip(self, input), fields(actor = actor.user_id))]
    pub async fn create(&self, actor: &Actor, input: CreateClientInput) -> Result<Client> {
        let agent_id = match (actor.is_staff(), input.agent_id) {
            (true, Some(agent_id)) => {
                self.ensure_active_agent(agent_id).await?;
                agent_id
            }
            (true, None) => {
                return Err(CrmError::Validation("请指定负责的业务员".to_string()));
            }
            (false, Some(agent_id)) if agent_id != actor.user_id => {
                return Err(CrmError::Forbidden("业务员只能为自己建档".to_string()));
            }
            (false, _) => actor.user_id,
        };

        let new_client = NewClient {
            agent_id,
            first_name: required_text(&input.first_name, "名")?,
            last_name: required_text(&input.last_name, "姓")?,
            email: input.email,
            phone: input.phone,
            state: input.state.map(|s| s.trim().to_ascii_uppercase()),
            notes: input.notes,
            intake_deadline: Utc::now() + Duration::days(self.config.intake_deadline_days),
        };

        // client_id 由仓储在插入后补上
        let event = NewEvent {
            client_id: None,
            actor_id: Some(actor.user_id),
            event_type: EventType::ClientCreated,
            payload: json!({ "agentId": agent_id }),
        };
        let client = self.clients.create(&new_client, &event).await?;

        metrics::record_client_transition(ClientStatus::Intake.as_str());
        info!(client_id = client.id, agent_id, "客户建档成功");
        Ok(client)
    }

    pub async fn get(&self, actor: &Actor, id: i64) -> Result<Client> {
        load_client(self.clients.as_ref(), actor, id).await
    }

    /// 列表查询，业务员强制限定为本人客户
    pub async fn list(
        &self,
        actor: &Actor,
        mut filter: ClientFilter,
        paging: Paging,
    ) -> Result<Page<Client>> {
        if let Some(agent_id) = actor.agent_scope() {
            filter.agent_id = Some(agent_id);
        }
        self.clients.list(&filter, paging).await
    }

    /// 导出用的客户列表
    pub async fn list_for_export(&self, actor: &Actor, mut filter: ClientFilter) -> Result<Vec<Client>> {
        if let Some(agent_id) = actor.agent_scope() {
            filter.agent_id = Some(agent_id);
        }
        self.clients.list_for_export(&filter, MAX_EXPORT_ROWS).await
    }

    /// 关键字搜索：姓名、邮箱、电话
    #[instrument(skip(self), fields(actor = actor.user_id))]
    pub async fn search(&self, actor: &Actor, keyword: &str, limit: Option<i64>) -> Result<Vec<Client>> {
        let keyword = keyword.trim();
        let len = keyword.chars().count();
        if len < MIN_SEARCH_LEN {
            return Err(CrmError::Validation(format!(
                "搜索关键字至少 {MIN_SEARCH_LEN} 个字符"
            )));
        }
        if len > MAX_SEARCH_LEN {
            return Err(CrmError::Validation(format!(
                "搜索关键字最多 {MAX_SEARCH_LEN} 个字符"
            )));
        }
        let limit = limit.unwrap_or(20).clamp(1, MAX_SEARCH_LIMIT);
        self.clients.search(keyword, actor.agent_scope(), limit).await
    }

    /// 更新联系信息：业务员仅在 Intake 阶段可改，后台员工在终态前都可改
    #[instrument(skip(self, update), fields(actor = actor.user_id))]
    pub async fn update(&self, actor: &Actor, id: i64, update: ClientUpdate) -> Result<Client> {
        let client = load_client(self.clients.as_ref(), actor, id).await?;

        if update.is_empty() {
            return Ok(client);
        }
        if client.status.is_terminal() {
            return Err(CrmError::InvalidStatusTransition {
                entity: "客户",
                from: client.status.as_str().to_string(),
                to: "updated".to_string(),
            });
        }
        if !actor.is_staff() && client.status != ClientStatus::Intake {
            return Err(CrmError::Forbidden("客户已提交审核，资料只能由后台修改".to_string()));
        }
        for (value, field) in [(&update.first_name, "名"), (&update.last_name, "姓")] {
            if let Some(v) = value {
                required_text(v, field)?;
            }
        }

        let event = NewEvent::client(id, actor.user_id, EventType::ClientUpdated);
        self.clients
            .update_contact(id, &update, &event)
            .await?
            .ok_or(CrmError::ConcurrentModification)
    }

    /// 提交审核：至少登记一个平台
    #[instrument(skip(self), fields(actor = actor.user_id))]
    pub async fn submit(&self, actor: &Actor, id: i64) -> Result<Client> {
        let client = load_client(self.clients.as_ref(), actor, id).await?;
        ensure_transition(&client, ClientStatus::PendingReview)?;

        if self.platforms.list_by_client(id).await?.is_empty() {
            return Err(CrmError::NoPlatforms);
        }

        let updated = self
            .transition(&client, actor, ClientStatus::PendingReview, None, None)
            .await?;

        self.notifier
            .notify_roles(
                &UserRole::STAFF,
                Some(actor.user_id),
                NotificationDraft::new(
                    NotificationKind::ClientSubmitted,
                    "客户提交审核",
                    format!("{} 已提交审核", updated.full_name()),
                )
                .for_client(id),
            )
            .await;

        Ok(updated)
    }

    /// 审核通过
    #[instrument(skip(self), fields(actor = actor.user_id))]
    pub async fn approve(&self, actor: &Actor, id: i64) -> Result<Client> {
        ensure_staff(actor)?;
        let client = load_client(self.clients.as_ref(), actor, id).await?;
        ensure_transition(&client, ClientStatus::Active)?;

        let updated = self
            .transition(&client, actor, ClientStatus::Active, None, None)
            .await?;

        self.notifier
            .notify_user(
                updated.agent_id,
                NotificationDraft::new(
                    NotificationKind::ClientApproved,
                    "客户审核通过",
                    format!("{} 已审核通过", updated.full_name()),
                )
                .for_client(id),
            )
            .await;

        Ok(updated)
    }

    /// 退回补充资料，同时给业务员创建待办
    #[instrument(skip(self, note), fields(actor = actor.user_id))]
    pub async fn return_to_intake(&self, actor: &Actor, id: i64, note: &str) -> Result<Client> {
        ensure_staff(actor)?;
        let note = required_text(note, "退回说明")?;
        let client = load_client(self.clients.as_ref(), actor, id).await?;
        ensure_transition(&client, ClientStatus::Intake)?;

        let todo = NewTodo {
            title: format!("补充客户资料: {}", client.full_name()),
            description: Some(note.clone()),
            assignee_id: client.agent_id,
            client_id: Some(id),
            due_at: Some(client.intake_deadline),
            created_by: Some(actor.user_id),
        };
        let updated = self
            .transition(&client, actor, ClientStatus::Intake, Some(note.clone()), Some(todo))
            .await?;

        self.notifier
            .notify_user(
                updated.agent_id,
                NotificationDraft::new(
                    NotificationKind::ClientReturned,
                    "客户被退回",
                    format!("{} 被退回: {}", updated.full_name(), note),
                )
                .for_client(id),
            )
            .await;

        Ok(updated)
    }

    /// 拒绝入驻
    #[instrument(skip(self, reason), fields(actor = actor.user_id))]
    pub async fn reject(&self, actor: &Actor, id: i64, reason: &str) -> Result<Client> {
        ensure_staff(actor)?;
        let reason = required_text(reason, "拒绝原因")?;
        let client = load_client(self.clients.as_ref(), actor, id).await?;
        ensure_transition(&client, ClientStatus::Rejected)?;

        let updated = self
            .transition(&client, actor, ClientStatus::Rejected, Some(reason.clone()), None)
            .await?;

        self.notifier
            .notify_user(
                updated.agent_id,
                NotificationDraft::new(
                    NotificationKind::ClientRejected,
                    "客户被拒绝",
                    format!("{} 未通过审核: {}", updated.full_name(), reason),
                )
                .for_client(id),
            )
            .await;

        Ok(updated)
    }

    /// 更换负责业务员
    #[instrument(skip(self), fields(actor = actor.user_id))]
    pub async fn assign_agent(&self, actor: &Actor, id: i64, agent_id: i64) -> Result<Client> {
        ensure_staff(actor)?;
        let client = load_client(self.clients.as_ref(), actor, id).await?;
        if client.status.is_terminal() {
            return Err(CrmError::InvalidStatusTransition {
                entity: "客户",
                from: client.status.as_str().to_string(),
                to: "reassigned".to_string(),
            });
        }
        if client.agent_id == agent_id {
            return Ok(client);
        }
        self.ensure_active_agent(agent_id).await?;

        let event = NewEvent::client(id, actor.user_id, EventType::AgentAssigned)
            .with_payload(json!({ "from": client.agent_id, "to": agent_id }));
        let updated = self
            .clients
            .assign_agent(id, agent_id, &event)
            .await?
            .ok_or(CrmError::ConcurrentModification)?;

        self.notifier
            .notify_user(
                agent_id,
                NotificationDraft::new(
                    NotificationKind::ClientAssigned,
                    "新分配客户",
                    format!("{} 已分配给你", updated.full_name()),
                )
                .for_client(id),
            )
            .await;

        Ok(updated)
    }

    /// 指定或清除客户的分润规则
    #[instrument(skip(self), fields(actor = actor.user_id))]
    pub async fn assign_profit_share_rule(
        &self,
        actor: &Actor,
        id: i64,
        rule_id: Option<i64>,
    ) -> Result<Client> {
        ensure_staff(actor)?;
        load_client(self.clients.as_ref(), actor, id).await?;

        if let Some(rule_id) = rule_id {
            let rule = self
                .rules
                .get_rule(rule_id)
                .await?
                .ok_or(CrmError::ProfitShareRuleNotFound(rule_id))?;
            if !rule.active {
                return Err(CrmError::ProfitShareRuleInactive(rule_id));
            }
        }

        let event = NewEvent::client(id, actor.user_id, EventType::ProfitShareRuleAssigned)
            .with_payload(json!({ "ruleId": rule_id }));
        self.clients
            .assign_profit_share_rule(id, rule_id, &event)
            .await?
            .ok_or(CrmError::ClientNotFound(id))
    }

    /// 客户事件时间线
    pub async fn list_events(
        &self,
        actor: &Actor,
        id: i64,
        paging: Paging,
    ) -> Result<Page<EventLog>> {
        load_client(self.clients.as_ref(), actor, id).await?;
        self.events.list_by_client(id, paging).await
    }

    async fn ensure_active_agent(&self, agent_id: i64) -> Result<()> {
        let agent = self
            .users
            .get(agent_id)
            .await?
            .ok_or(CrmError::UserNotFound(agent_id))?;
        if agent.role != UserRole::Agent || !agent.is_active() {
            return Err(CrmError::Validation(format!(
                "用户 {agent_id} 不是启用状态的业务员"
            )));
        }
        Ok(())
    }

    async fn transition(
        &self,
        client: &Client,
        actor: &Actor,
        to: ClientStatus,
        note: Option<String>,
        todo: Option<NewTodo>,
    ) -> Result<Client> {
        let event_type = match to {
            ClientStatus::PendingReview => EventType::ClientSubmitted,
            ClientStatus::Active => EventType::ClientApproved,
            ClientStatus::Intake => EventType::ClientReturned,
            ClientStatus::Rejected => EventType::ClientRejected,
            ClientStatus::Closed => EventType::ClientClosed,
        };
        let event = NewEvent::client(client.id, actor.user_id, event_type).with_payload(json!({
            "from": client.status,
            "to": to,
            "note": note,
        }));

        let transition = ClientTransition {
            client_id: client.id,
            from: client.status,
            to,
            note,
            event,
            todo,
        };
        let updated = self
            .clients
            .transition(&transition)
            .await?
            .ok_or(CrmError::ConcurrentModification)?;

        metrics::record_client_transition(to.as_str());
        info!(
            client_id = client.id,
            from = client.status.as_str(),
            to = to.as_str(),
            "客户状态变更"
        );
        Ok(updated)
    }
}

fn ensure_transition(client: &Client, to: ClientStatus) -> Result<()> {
    if client.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(CrmError::InvalidStatusTransition {
            entity: "客户",
            from: client.status.as_str().to_string(),
            to: to.as_str().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_fixtures::{agent, client_in, platform, user_with_role};
    use crate::models::{PlatformKind, UserStatus};
    use crate::repository::{
        MockClientRepositoryTrait, MockEventLogRepositoryTrait, MockNotificationRepositoryTrait,
        MockPlatformRepositoryTrait, MockProfitShareRepositoryTrait, MockUserRepositoryTrait,
    };

    struct Mocks {
        clients: MockClientRepositoryTrait,
        platforms: MockPlatformRepositoryTrait,
        users: MockUserRepositoryTrait,
        rules: MockProfitShareRepositoryTrait,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                clients: MockClientRepositoryTrait::new(),
                platforms: MockPlatformRepositoryTrait::new(),
                users: MockUserRepositoryTrait::new(),
                rules: MockProfitShareRepositoryTrait::new(),
            }
        }

        fn build(self) -> ClientService {
            let mut notifications = MockNotificationRepositoryTrait::new();
            notifications
                .expect_create_many()
                .returning(|items| Ok(items.len() as u64));
            let mut notify_users = MockUserRepositoryTrait::new();
            notify_users
                .expect_list_active_by_roles()
                .returning(|_| Ok(vec![user_with_role(900, UserRole::Backoffice)]));
            let notifier = Arc::new(NotificationService::new(
                Arc::new(notifications),
                Arc::new(notify_users),
            ));

            ClientService::new(
                Arc::new(self.clients),
                Arc::new(self.platforms),
                Arc::new(self.users),
                Arc::new(self.rules),
                Arc::new(MockEventLogRepositoryTrait::new()),
                notifier,
                BusinessConfig::default(),
            )
        }
    }

    fn input() -> CreateClientInput {
        CreateClientInput {
            agent_id: None,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: Some("ada@example.test".to_string()),
            phone: None,
            state: Some("nj".to_string()),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_agent_creates_client_for_self() {
        let mut mocks = Mocks::new();
        mocks
            .clients
            .expect_create()
            .withf(|c, e| {
                c.agent_id == 7
                    && c.state.as_deref() == Some("NJ")
                    && c.intake_deadline > Utc::now() + Duration::days(29)
                    && e.event_type == EventType::ClientCreated
            })
            .returning(|c, _| {
                let mut client = client_in(1, c.agent_id, ClientStatus::Intake);
                client.intake_deadline = c.intake_deadline;
                Ok(client)
            });

        let service = mocks.build();
        let actor = agent(7, 0, None).actor();
        let client = service.create(&actor, input()).await.unwrap();
        assert_eq!(client.agent_id, 7);
    }

    #[tokio::test]
    async fn test_agent_cannot_create_for_other_agent() {
        let service = Mocks::new().build();
        let actor = agent(7, 0, None).actor();
        let err = service
            .create(&actor, CreateClientInput { agent_id: Some(8), ..input() })
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_staff_must_assign_active_agent() {
        let mut mocks = Mocks::new();
        mocks.users.expect_get().returning(|id| {
            let mut user = agent(id, 0, None);
            user.status = UserStatus::Disabled;
            Ok(Some(user))
        });
        let service = mocks.build();
        let staff = user_with_role(1, UserRole::Backoffice).actor();

        let err = service
            .create(&staff, CreateClientInput { agent_id: Some(8), ..input() })
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));

        let err = service.create(&staff, input()).await.unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));
    }

    #[tokio::test]
    async fn test_submit_requires_platform() {
        let mut mocks = Mocks::new();
        mocks
            .clients
            .expect_get()
            .returning(|id| Ok(Some(client_in(id, 7, ClientStatus::Intake))));
        mocks.platforms.expect_list_by_client().returning(|_| Ok(vec![]));
        mocks.clients.expect_transition().never();

        let service = mocks.build();
        let actor = agent(7, 0, None).actor();
        let err = service.submit(&actor, 1).await.unwrap_err();
        assert!(matches!(err, CrmError::NoPlatforms));
    }

    #[tokio::test]
    async fn test_submit_moves_to_pending_review() {
        let mut mocks = Mocks::new();
        mocks
            .clients
            .expect_get()
            .returning(|id| Ok(Some(client_in(id, 7, ClientStatus::Intake))));
        mocks
            .platforms
            .expect_list_by_client()
            .returning(|id| Ok(vec![platform(1, id, PlatformKind::Betmgm)]));
        mocks
            .clients
            .expect_transition()
            .withf(|t| {
                t.from == ClientStatus::Intake
                    && t.to == ClientStatus::PendingReview
                    && t.event.event_type == EventType::ClientSubmitted
            })
            .times(1)
            .returning(|t| Ok(Some(client_in(t.client_id, 7, t.to))));

        let service = mocks.build();
        let actor = agent(7, 0, None).actor();
        let client = service.submit(&actor, 1).await.unwrap();
        assert_eq!(client.status, ClientStatus::PendingReview);
    }

    #[tokio::test]
    async fn test_agent_cannot_see_foreign_client() {
        let mut mocks = Mocks::new();
        mocks
            .clients
            .expect_get()
            .returning(|id| Ok(Some(client_in(id, 8, ClientStatus::Intake))));
        let service = mocks.build();
        let actor = agent(7, 0, None).actor();

        let err = service.get(&actor, 5).await.unwrap_err();
        assert!(matches!(err, CrmError::ClientNotFound(5)));
    }

    #[tokio::test]
    async fn test_agent_cannot_approve() {
        let service = Mocks::new().build();
        let actor = agent(7, 0, None).actor();
        let err = service.approve(&actor, 1).await.unwrap_err();
        assert!(matches!(err, CrmError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_approve_rejects_wrong_status() {
        let mut mocks = Mocks::new();
        mocks
            .clients
            .expect_get()
            .returning(|id| Ok(Some(client_in(id, 7, ClientStatus::Intake))));
        let service = mocks.build();
        let staff = user_with_role(1, UserRole::Backoffice).actor();

        let err = service.approve(&staff, 1).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATUS_TRANSITION");
    }

    #[tokio::test]
    async fn test_return_creates_todo_for_agent() {
        let mut mocks = Mocks::new();
        mocks
            .clients
            .expect_get()
            .returning(|id| Ok(Some(client_in(id, 7, ClientStatus::PendingReview))));
        mocks
            .clients
            .expect_transition()
            .withf(|t| {
                t.to == ClientStatus::Intake
                    && t.note.as_deref() == Some("缺少身份证明")
                    && t.todo.as_ref().is_some_and(|todo| todo.assignee_id == 7)
            })
            .times(1)
            .returning(|t| Ok(Some(client_in(t.client_id, 7, t.to))));

        let service = mocks.build();
        let staff = user_with_role(1, UserRole::Backoffice).actor();
        service
            .return_to_intake(&staff, 3, "  缺少身份证明 ")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reject_requires_reason() {
        let service = Mocks::new().build();
        let staff = user_with_role(1, UserRole::Admin).actor();
        let err = service.reject(&staff, 3, "   ").await.unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));
    }

    #[tokio::test]
    async fn test_concurrent_transition_is_reported() {
        let mut mocks = Mocks::new();
        mocks
            .clients
            .expect_get()
            .returning(|id| Ok(Some(client_in(id, 7, ClientStatus::PendingReview))));
        mocks.clients.expect_transition().returning(|_| Ok(None));

        let service = mocks.build();
        let staff = user_with_role(1, UserRole::Backoffice).actor();
        let err = service.approve(&staff, 3).await.unwrap_err();
        assert!(matches!(err, CrmError::ConcurrentModification));
    }

    #[tokio::test]
    async fn test_search_validation_and_scope() {
        let mut mocks = Mocks::new();
        mocks
            .clients
            .expect_search()
            .withf(|k, agent, limit| k == "ann" && *agent == Some(7) && *limit == 50)
            .returning(|_, _, _| Ok(vec![]));
        let service = mocks.build();
        let actor = agent(7, 0, None).actor();

        let err = service.search(&actor, " a ", None).await.unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));

        let long = "x".repeat(101);
        assert!(service.search(&actor, &long, None).await.is_err());

        service.search(&actor, " ann ", Some(500)).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_forces_agent_scope() {
        let mut mocks = Mocks::new();
        mocks
            .clients
            .expect_list()
            .withf(|f, _| f.agent_id == Some(7))
            .returning(|_, _| Ok(Page::empty()));
        let service = mocks.build();
        let actor = agent(7, 0, None).actor();

        let filter = ClientFilter {
            agent_id: Some(99),
            ..Default::default()
        };
        service.list(&actor, filter, Paging::default()).await.unwrap();
    }

    #[tokio::test]
    async fn test_agent_update_only_in_intake() {
        let mut mocks = Mocks::new();
        mocks
            .clients
            .expect_get()
            .returning(|id| Ok(Some(client_in(id, 7, ClientStatus::PendingReview))));
        let service = mocks.build();
        let actor = agent(7, 0, None).actor();

        let update = ClientUpdate {
            phone: Some("555-0100".into()),
            ..Default::default()
        };
        let err = service.update(&actor, 1, update).await.unwrap_err();
        assert!(matches!(err, CrmError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_assign_inactive_rule_rejected() {
        let mut mocks = Mocks::new();
        mocks
            .clients
            .expect_get()
            .returning(|id| Ok(Some(client_in(id, 7, ClientStatus::Active))));
        mocks.rules.expect_get_rule().returning(|id| {
            let now = Utc::now();
            Ok(Some(crate::models::ProfitShareRule {
                id,
                name: "默认".into(),
                description: None,
                active: false,
                created_by: 1,
                created_at: now,
                updated_at: now,
                details: vec![],
            }))
        });
        let service = mocks.build();
        let staff = user_with_role(1, UserRole::Backoffice).actor();

        let err = service
            .assign_profit_share_rule(&staff, 1, Some(4))
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::ProfitShareRuleInactive(4)));
    }
}
