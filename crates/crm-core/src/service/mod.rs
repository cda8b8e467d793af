//! 业务服务层
//!
//! 每个服务只依赖仓储 Trait，权限判断与业务校验都在这里完成。

mod client_service;
mod closure_service;
mod commission_service;
mod document_service;
mod extension_service;
mod notification_service;
mod profit_share_service;
mod todo_service;
mod user_service;
mod verification_service;

pub use client_service::{ClientService, CreateClientInput, MIN_SEARCH_LEN};
pub use closure_service::{ClosureCheck, ClosureService, outstanding_balances};
pub use commission_service::{CommissionService, CreatePoolInput, PoolDetail, compute_allocations};
pub use document_service::{DocumentService, FileStore, UploadInput, sanitize_file_name};
pub use extension_service::ExtensionService;
pub use notification_service::NotificationService;
pub use profit_share_service::{
    CreateSettlementInput, ProfitShareService, split_profit, validate_rule_details,
};
pub use todo_service::{CreateTodoInput, TodoService};
pub use user_service::{CreateUserInput, UserService};
pub use verification_service::{VerificationService, check_attempt_allowed, next_attempt_state};

use std::sync::Arc;

use crm_shared::config::{BusinessConfig, StorageConfig};
use rust_decimal::{Decimal, RoundingStrategy};
use sqlx::PgPool;

use crate::error::{CrmError, Result};
use crate::models::{Actor, Client};
use crate::repository::{
    BonusRepository, ClientRepository, ClientRepositoryTrait, DocumentRepository,
    EventLogRepository, ExtensionRepository, NotificationRepository, PlatformRepository,
    ProfitShareRepository, TodoRepository, UserRepository,
};

/// 全部业务服务，HTTP 层通过它访问业务
pub struct CrmServices {
    pub users: Arc<UserService>,
    pub clients: Arc<ClientService>,
    pub verification: Arc<VerificationService>,
    pub extensions: Arc<ExtensionService>,
    pub closure: Arc<ClosureService>,
    pub commission: Arc<CommissionService>,
    pub profit_share: Arc<ProfitShareService>,
    pub todos: Arc<TodoService>,
    pub notifications: Arc<NotificationService>,
    pub documents: Arc<DocumentService>,
}

impl CrmServices {
    /// 以 PostgreSQL 仓储装配所有服务
    pub fn new(
        pool: PgPool,
        business: BusinessConfig,
        storage: StorageConfig,
        file_store: Arc<dyn FileStore>,
    ) -> Self {
        let users = Arc::new(UserRepository::new(pool.clone()));
        let clients = Arc::new(ClientRepository::new(pool.clone()));
        let platforms = Arc::new(PlatformRepository::new(pool.clone()));
        let extensions = Arc::new(ExtensionRepository::new(pool.clone()));
        let bonus = Arc::new(BonusRepository::new(pool.clone()));
        let profit = Arc::new(ProfitShareRepository::new(pool.clone()));
        let todos = Arc::new(TodoRepository::new(pool.clone()));
        let notifications = Arc::new(NotificationRepository::new(pool.clone()));
        let events = Arc::new(EventLogRepository::new(pool.clone()));
        let documents = Arc::new(DocumentRepository::new(pool));

        let notifier = Arc::new(NotificationService::new(notifications, users.clone()));

        Self {
            users: Arc::new(UserService::new(users.clone())),
            clients: Arc::new(ClientService::new(
                clients.clone(),
                platforms.clone(),
                users.clone(),
                profit.clone(),
                events,
                notifier.clone(),
                business.clone(),
            )),
            verification: Arc::new(VerificationService::new(
                clients.clone(),
                platforms.clone(),
                notifier.clone(),
                business.clone(),
            )),
            extensions: Arc::new(ExtensionService::new(
                clients.clone(),
                extensions,
                notifier.clone(),
                business.clone(),
            )),
            closure: Arc::new(ClosureService::new(
                clients.clone(),
                platforms,
                notifier.clone(),
            )),
            commission: Arc::new(CommissionService::new(
                clients.clone(),
                users.clone(),
                bonus,
                notifier.clone(),
                business,
            )),
            profit_share: Arc::new(ProfitShareService::new(
                clients.clone(),
                users.clone(),
                profit,
                notifier.clone(),
            )),
            todos: Arc::new(TodoService::new(
                todos,
                clients.clone(),
                users,
                notifier.clone(),
            )),
            documents: Arc::new(DocumentService::new(clients, documents, file_store, storage)),
            notifications: notifier,
        }
    }
}

/// 要求后台员工身份
pub(crate) fn ensure_staff(actor: &Actor) -> Result<()> {
    if actor.is_staff() {
        Ok(())
    } else {
        Err(CrmError::Forbidden("需要后台权限".to_string()))
    }
}

/// 要求管理员身份
pub(crate) fn ensure_admin(actor: &Actor) -> Result<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(CrmError::Forbidden("需要管理员权限".to_string()))
    }
}

/// 加载客户并校验可见性
///
/// 业务员访问他人客户时返回不存在，避免泄露客户 ID 是否有效
pub(crate) async fn load_client(
    repo: &dyn ClientRepositoryTrait,
    actor: &Actor,
    client_id: i64,
) -> Result<Client> {
    let client = repo
        .get(client_id)
        .await?
        .ok_or(CrmError::ClientNotFound(client_id))?;

    if !actor.can_access_client(&client) {
        return Err(CrmError::ClientNotFound(client_id));
    }
    Ok(client)
}

/// 必填文本：去除首尾空白后不能为空
pub(crate) fn required_text(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CrmError::Validation(format!("{field}不能为空")));
    }
    Ok(trimmed.to_string())
}

/// 截断到分（向零取整）
pub(crate) fn truncate_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

/// 金额必须为非负且最多两位小数
pub(crate) fn ensure_money(amount: Decimal, field: &str) -> Result<()> {
    if amount.is_sign_negative() {
        return Err(CrmError::InvalidAmount(format!("{field}不能为负数")));
    }
    if amount.normalize().scale() > 2 {
        return Err(CrmError::InvalidAmount(format!("{field}最多两位小数")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_truncate_cents() {
        assert_eq!(truncate_cents(dec!(10.239)), dec!(10.23));
        assert_eq!(truncate_cents(dec!(0.009)), dec!(0.00));
        assert_eq!(truncate_cents(dec!(5)), dec!(5));
    }

    #[test]
    fn test_ensure_money() {
        assert!(ensure_money(dec!(0), "金额").is_ok());
        assert!(ensure_money(dec!(12.50), "金额").is_ok());
        assert!(ensure_money(dec!(12.500), "金额").is_ok());
        assert!(matches!(ensure_money(dec!(-1), "金额"), Err(CrmError::InvalidAmount(_))));
        assert!(matches!(ensure_money(dec!(1.005), "金额"), Err(CrmError::InvalidAmount(_))));
    }

    #[test]
    fn test_required_text() {
        assert_eq!(required_text("  ok ", "原因").unwrap(), "ok");
        assert!(matches!(required_text("   ", "原因"), Err(CrmError::Validation(_))));
    }
}
