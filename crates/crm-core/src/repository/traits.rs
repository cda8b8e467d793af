//! 仓储 Trait 定义
//!
//! 服务层依赖抽象而非具体实现，单元测试中以 mockall 生成的 Mock 替代。
//! 写操作是粗粒度的：一次调用对应一个事务，业务行与事件日志同时落库。
//! 带前置状态条件的写入在条件不满足时返回 `None`，由服务层转换为冲突错误。

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::Result;
use crate::models::{
    AttemptUpdate, BonusAllocation, BonusPool, Client, ClientFilter, ClientPlatform, ClientStatus,
    ClientUpdate, Document, EventLog, ExtensionApproval, ExtensionFilter, ExtensionRequest,
    NewAllocation, NewBonusPool, NewClient, NewDocument, NewEvent, NewExtensionRequest,
    NewNotification, NewPlatform, NewProfitShareRule, NewSettlement, NewSettlementLine, NewTodo,
    NewUser, Notification, Page, Paging, PoolFilter, ProfitShareRule, Settlement,
    SettlementFilter, Todo, TodoFilter, TodoStatus, User, UserFilter, UserRole, UserUpdate,
};

/// 用户仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepositoryTrait: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<User>>;
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn get_many(&self, ids: &[i64]) -> Result<Vec<User>>;
    async fn list(&self, filter: &UserFilter, paging: Paging) -> Result<Page<User>>;
    /// 指定角色中所有启用的用户
    async fn list_active_by_roles(&self, roles: &[UserRole]) -> Result<Vec<User>>;
    async fn create(&self, user: &NewUser) -> Result<User>;
    async fn update(&self, id: i64, update: &UserUpdate) -> Result<Option<User>>;
    async fn set_password(&self, id: i64, password_hash: &str) -> Result<bool>;
    async fn record_login_failure(
        &self,
        id: i64,
        attempts: i32,
        locked_until: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<()>;
    async fn record_login_success(&self, id: i64) -> Result<()>;
    /// 从指定用户开始沿上级链向上，返回本人及最多 `max_depth` 层上级（按层级顺序）
    async fn upline_chain(&self, user_id: i64, max_depth: usize) -> Result<Vec<User>>;
}

/// 客户状态流转的写入参数
#[derive(Debug, Clone, PartialEq)]
pub struct ClientTransition {
    pub client_id: i64,
    pub from: ClientStatus,
    pub to: ClientStatus,
    /// 退回或拒绝说明，写入 status_note
    pub note: Option<String>,
    pub event: NewEvent,
    /// 同事务创建的待办（如退回时给业务员的待办）
    pub todo: Option<NewTodo>,
}

/// 客户仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClientRepositoryTrait: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<Client>>;
    async fn list(&self, filter: &ClientFilter, paging: Paging) -> Result<Page<Client>>;
    /// 导出用，不分页但有上限
    async fn list_for_export(&self, filter: &ClientFilter, limit: i64) -> Result<Vec<Client>>;
    async fn search(&self, keyword: &str, agent_id: Option<i64>, limit: i64)
    -> Result<Vec<Client>>;
    async fn create(&self, client: &NewClient, event: &NewEvent) -> Result<Client>;
    async fn update_contact(
        &self,
        id: i64,
        update: &ClientUpdate,
        event: &NewEvent,
    ) -> Result<Option<Client>>;
    async fn transition(&self, transition: &ClientTransition) -> Result<Option<Client>>;
    async fn assign_agent(&self, id: i64, agent_id: i64, event: &NewEvent)
    -> Result<Option<Client>>;
    async fn assign_profit_share_rule(
        &self,
        id: i64,
        rule_id: Option<i64>,
        event: &NewEvent,
    ) -> Result<Option<Client>>;
    /// 结案：仅当客户为 Active 且所有平台余额为零时写入，同时取消客户的未完成待办
    async fn close(&self, id: i64, reason: &str, event: &NewEvent) -> Result<Option<Client>>;
}

/// 平台仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlatformRepositoryTrait: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<ClientPlatform>>;
    async fn list_by_client(&self, client_id: i64) -> Result<Vec<ClientPlatform>>;
    async fn create(&self, platform: &NewPlatform, event: &NewEvent) -> Result<ClientPlatform>;
    /// NotStarted/Failed -> Pending
    async fn request_verification(&self, id: i64, event: &NewEvent)
    -> Result<Option<ClientPlatform>>;
    async fn record_attempt(
        &self,
        update: &AttemptUpdate,
        event: &NewEvent,
        todo: Option<NewTodo>,
    ) -> Result<Option<ClientPlatform>>;
    /// Locked -> Failed，失败次数清零
    async fn unlock(&self, id: i64, event: &NewEvent) -> Result<Option<ClientPlatform>>;
    async fn update_balance(
        &self,
        id: i64,
        balance: Decimal,
        event: &NewEvent,
    ) -> Result<Option<ClientPlatform>>;
}

/// 延期申请仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExtensionRepositoryTrait: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<ExtensionRequest>>;
    async fn list(&self, filter: &ExtensionFilter, paging: Paging)
    -> Result<Page<ExtensionRequest>>;
    async fn has_pending(&self, client_id: i64) -> Result<bool>;
    async fn create(
        &self,
        request: &NewExtensionRequest,
        event: &NewEvent,
    ) -> Result<ExtensionRequest>;
    /// 审批通过：申请仍为 Pending 且客户延期次数未达上限时，同时更新申请与客户期限
    async fn approve(
        &self,
        approval: &ExtensionApproval,
        event: &NewEvent,
    ) -> Result<Option<ExtensionRequest>>;
    async fn reject(
        &self,
        id: i64,
        reviewer_id: i64,
        note: &str,
        event: &NewEvent,
    ) -> Result<Option<ExtensionRequest>>;
}

/// 奖金池仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BonusRepositoryTrait: Send + Sync {
    async fn get_pool(&self, id: i64) -> Result<Option<BonusPool>>;
    async fn list_pools(&self, filter: &PoolFilter, paging: Paging) -> Result<Page<BonusPool>>;
    async fn list_allocations(&self, pool_id: i64) -> Result<Vec<BonusAllocation>>;
    async fn create_pool(&self, pool: &NewBonusPool, event: &NewEvent) -> Result<BonusPool>;
    /// Draft -> Allocated，同时写入分配行
    async fn save_allocations(
        &self,
        pool_id: i64,
        lines: &[NewAllocation],
        event: &NewEvent,
    ) -> Result<Option<BonusPool>>;
    /// Allocated -> Settled
    async fn settle(&self, pool_id: i64, event: &NewEvent) -> Result<Option<BonusPool>>;
}

/// 分润仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfitShareRepositoryTrait: Send + Sync {
    async fn get_rule(&self, id: i64) -> Result<Option<ProfitShareRule>>;
    async fn list_rules(&self, active: Option<bool>) -> Result<Vec<ProfitShareRule>>;
    async fn create_rule(&self, rule: &NewProfitShareRule) -> Result<ProfitShareRule>;
    async fn set_rule_active(&self, id: i64, active: bool) -> Result<Option<ProfitShareRule>>;
    async fn get_settlement(&self, id: i64) -> Result<Option<Settlement>>;
    async fn list_settlements(
        &self,
        filter: &SettlementFilter,
        paging: Paging,
    ) -> Result<Page<Settlement>>;
    async fn create_settlement(
        &self,
        settlement: &NewSettlement,
        lines: &[NewSettlementLine],
        event: &NewEvent,
    ) -> Result<Settlement>;
    /// Pending -> Confirmed
    async fn confirm_settlement(
        &self,
        id: i64,
        confirmed_by: i64,
        event: &NewEvent,
    ) -> Result<Option<Settlement>>;
}

/// 待办仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TodoRepositoryTrait: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<Todo>>;
    async fn list(&self, filter: &TodoFilter, paging: Paging) -> Result<Page<Todo>>;
    async fn create(&self, todo: &NewTodo) -> Result<Todo>;
    /// 当前状态为 `from` 时才更新为 `to`
    async fn set_status(&self, id: i64, from: TodoStatus, to: TodoStatus) -> Result<Option<Todo>>;
}

/// 通知仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationRepositoryTrait: Send + Sync {
    /// 批量写入，返回写入条数
    async fn create_many(&self, notifications: &[NewNotification]) -> Result<u64>;
    async fn list(&self, user_id: i64, unread_only: bool, paging: Paging)
    -> Result<Page<Notification>>;
    async fn unread_count(&self, user_id: i64) -> Result<i64>;
    /// 只能标记自己的通知，返回是否命中
    async fn mark_read(&self, id: i64, user_id: i64) -> Result<bool>;
    async fn mark_all_read(&self, user_id: i64) -> Result<u64>;
}

/// 事件日志仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventLogRepositoryTrait: Send + Sync {
    async fn list_by_client(&self, client_id: i64, paging: Paging) -> Result<Page<EventLog>>;
}

/// 文件仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentRepositoryTrait: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<Document>>;
    async fn list_by_client(&self, client_id: i64) -> Result<Vec<Document>>;
    async fn create(&self, document: &NewDocument, event: &NewEvent) -> Result<Document>;
}
