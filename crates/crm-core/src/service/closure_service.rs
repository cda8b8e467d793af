//! 客户结案
//!
//! 只有 Active 客户可以结案，且所有平台余额必须为零。
//! 余额检查在仓储事务内对平台行加锁后再次执行。

use std::sync::Arc;

use crm_shared::observability::metrics;
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument};

use super::{ensure_staff, load_client, required_text};
use crate::error::{CrmError, Result};
use crate::models::{
    Actor, Client, ClientPlatform, ClientStatus, EventType, NewEvent, NotificationDraft,
    NotificationKind, UserRole,
};
use crate::repository::{ClientRepositoryTrait, PlatformRepositoryTrait};
use crate::service::NotificationService;

/// 余额不为零的平台名称
pub fn outstanding_balances(platforms: &[ClientPlatform]) -> Vec<String> {
    platforms
        .iter()
        .filter(|p| !p.balance.is_zero())
        .map(|p| p.kind.display_name().to_string())
        .collect()
}

/// 结案前检查结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosureCheck {
    pub client_id: i64,
    pub status: ClientStatus,
    pub can_close: bool,
    pub outstanding_platforms: Vec<String>,
}

pub struct ClosureService {
    clients: Arc<dyn ClientRepositoryTrait>,
    platforms: Arc<dyn PlatformRepositoryTrait>,
    notifier: Arc<NotificationService>,
}

impl ClosureService {
    pub fn new(
        clients: Arc<dyn ClientRepositoryTrait>,
        platforms: Arc<dyn PlatformRepositoryTrait>,
        notifier: Arc<NotificationService>,
    ) -> Self {
        Self {
            clients,
            platforms,
            notifier,
        }
    }

    /// 不做修改，只返回当前是否满足结案条件
    pub async fn check(&self, actor: &Actor, client_id: i64) -> Result<ClosureCheck> {
        let client = load_client(self.clients.as_ref(), actor, client_id).await?;
        let outstanding = outstanding_balances(&self.platforms.list_by_client(client_id).await?);
        Ok(ClosureCheck {
            client_id,
            status: client.status,
            can_close: client.status == ClientStatus::Active && outstanding.is_empty(),
            outstanding_platforms: outstanding,
        })
    }

    #[instrument(skip(self, reason), fields(actor = actor.user_id))]
    pub async fn close(&self, actor: &Actor, client_id: i64, reason: &str) -> Result<Client> {
        ensure_staff(actor)?;
        let reason = required_text(reason, "结案原因")?;
        let client = load_client(self.clients.as_ref(), actor, client_id).await?;
        if !client.status.can_transition_to(ClientStatus::Closed) {
            return Err(CrmError::InvalidStatusTransition {
                entity: "客户",
                from: client.status.as_str().to_string(),
                to: ClientStatus::Closed.as_str().to_string(),
            });
        }
        self.ensure_zero_balances(client_id).await?;

        let event = NewEvent::client(client_id, actor.user_id, EventType::ClientClosed)
            .with_payload(json!({ "reason": reason }));
        let closed = match self.clients.close(client_id, &reason, &event).await? {
            Some(closed) => closed,
            None => {
                // 检查与写入之间余额或状态被改动
                self.ensure_zero_balances(client_id).await?;
                return Err(CrmError::ConcurrentModification);
            }
        };

        metrics::record_client_transition(ClientStatus::Closed.as_str());
        info!(client_id, "客户已结案");

        let draft = NotificationDraft::new(
            NotificationKind::ClientClosed,
            "客户已结案",
            format!("{} 已结案: {}", closed.full_name(), reason),
        )
        .for_client(client_id);
        self.notifier.notify_user(closed.agent_id, draft.clone()).await;
        self.notifier
            .notify_roles(&UserRole::STAFF, Some(actor.user_id), draft)
            .await;

        Ok(closed)
    }

    async fn ensure_zero_balances(&self, client_id: i64) -> Result<()> {
        let platforms = outstanding_balances(&self.platforms.list_by_client(client_id).await?);
        if platforms.is_empty() {
            Ok(())
        } else {
            Err(CrmError::OutstandingBalances { platforms })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlatformKind;
    use crate::models::test_fixtures::{agent, client_in, platform, user_with_role};
    use crate::repository::{
        MockClientRepositoryTrait, MockNotificationRepositoryTrait, MockPlatformRepositoryTrait,
        MockUserRepositoryTrait,
    };
    use rust_decimal_macros::dec;

    fn notifier() -> Arc<NotificationService> {
        let mut notifications = MockNotificationRepositoryTrait::new();
        notifications
            .expect_create_many()
            .returning(|items| Ok(items.len() as u64));
        let mut users = MockUserRepositoryTrait::new();
        users.expect_list_active_by_roles().returning(|_| Ok(vec![]));
        Arc::new(NotificationService::new(Arc::new(notifications), Arc::new(users)))
    }

    fn service(
        clients: MockClientRepositoryTrait,
        platforms: MockPlatformRepositoryTrait,
    ) -> ClosureService {
        ClosureService::new(Arc::new(clients), Arc::new(platforms), notifier())
    }

    fn client_repo(status: ClientStatus) -> MockClientRepositoryTrait {
        let mut clients = MockClientRepositoryTrait::new();
        clients
            .expect_get()
            .returning(move |id| Ok(Some(client_in(id, 7, status))));
        clients
    }

    #[test]
    fn test_outstanding_balances() {
        let mut a = platform(1, 1, PlatformKind::Betmgm);
        a.balance = dec!(12.50);
        let b = platform(2, 1, PlatformKind::Bank);
        let mut c = platform(3, 1, PlatformKind::Fanduel);
        c.balance = dec!(0.00);

        assert_eq!(outstanding_balances(&[a, b, c]), vec!["BetMGM".to_string()]);
        assert!(outstanding_balances(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_close_refused_with_balances() {
        let mut platforms = MockPlatformRepositoryTrait::new();
        platforms.expect_list_by_client().returning(|id| {
            let mut p = platform(1, id, PlatformKind::Draftkings);
            p.balance = dec!(3.00);
            Ok(vec![p, platform(2, id, PlatformKind::Bank)])
        });
        let mut clients = client_repo(ClientStatus::Active);
        clients.expect_close().never();

        let staff = user_with_role(1, UserRole::Backoffice).actor();
        let err = service(clients, platforms)
            .close(&staff, 4, "客户主动结束合作")
            .await
            .unwrap_err();
        match err {
            CrmError::OutstandingBalances { platforms } => {
                assert_eq!(platforms, vec!["DraftKings".to_string()]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_close_requires_active_client() {
        let staff = user_with_role(1, UserRole::Backoffice).actor();
        let err = service(client_repo(ClientStatus::Intake), MockPlatformRepositoryTrait::new())
            .close(&staff, 4, "结束")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_STATUS_TRANSITION");
    }

    #[tokio::test]
    async fn test_close_succeeds_with_zero_balances() {
        let mut platforms = MockPlatformRepositoryTrait::new();
        platforms
            .expect_list_by_client()
            .returning(|id| Ok(vec![platform(1, id, PlatformKind::Betmgm)]));
        let mut clients = client_repo(ClientStatus::Active);
        clients
            .expect_close()
            .withf(|id, reason, e| *id == 4 && reason == "结束" && e.event_type == EventType::ClientClosed)
            .times(1)
            .returning(|id, _, _| Ok(Some(client_in(id, 7, ClientStatus::Closed))));

        let staff = user_with_role(1, UserRole::Admin).actor();
        let closed = service(clients, platforms).close(&staff, 4, " 结束 ").await.unwrap();
        assert_eq!(closed.status, ClientStatus::Closed);
    }

    #[tokio::test]
    async fn test_agent_cannot_close() {
        let actor = agent(7, 0, None).actor();
        let err = service(MockClientRepositoryTrait::new(), MockPlatformRepositoryTrait::new())
            .close(&actor, 4, "结束")
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_check_reports_outstanding() {
        let mut platforms = MockPlatformRepositoryTrait::new();
        platforms.expect_list_by_client().returning(|id| {
            let mut p = platform(1, id, PlatformKind::Caesars);
            p.balance = dec!(1);
            Ok(vec![p])
        });
        let actor = agent(7, 0, None).actor();
        let check = service(client_repo(ClientStatus::Active), platforms)
            .check(&actor, 4)
            .await
            .unwrap();
        assert!(!check.can_close);
        assert_eq!(check.outstanding_platforms, vec!["Caesars".to_string()]);
    }
}
