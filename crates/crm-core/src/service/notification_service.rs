//! 通知服务
//!
//! 通知扇出失败只记日志，不影响触发它的业务操作。

use std::sync::Arc;

use crm_shared::observability::metrics;
use tracing::{instrument, warn};

use crate::error::{CrmError, Result};
use crate::models::{Actor, NewNotification, Notification, NotificationDraft, Page, Paging, UserRole};
use crate::repository::{NotificationRepositoryTrait, UserRepositoryTrait};

pub struct NotificationService {
    repo: Arc<dyn NotificationRepositoryTrait>,
    users: Arc<dyn UserRepositoryTrait>,
}

impl NotificationService {
    pub fn new(
        repo: Arc<dyn NotificationRepositoryTrait>,
        users: Arc<dyn UserRepositoryTrait>,
    ) -> Self {
        Self { repo, users }
    }

    /// 通知单个用户
    pub async fn notify_user(&self, user_id: i64, draft: NotificationDraft) {
        self.notify_users(&[user_id], draft).await;
    }

    /// 通知多个用户，重复的收件人只发一次
    #[instrument(skip(self, draft), fields(kind = draft.kind.as_str()))]
    pub async fn notify_users(&self, user_ids: &[i64], draft: NotificationDraft) {
        let mut recipients = user_ids.to_vec();
        recipients.sort_unstable();
        recipients.dedup();
        self.deliver(recipients, draft).await;
    }

    /// 扇出到角色组内所有启用用户，排除操作者本人
    #[instrument(skip(self, draft), fields(kind = draft.kind.as_str()))]
    pub async fn notify_roles(&self, roles: &[UserRole], exclude: Option<i64>, draft: NotificationDraft) {
        let users = match self.users.list_active_by_roles(roles).await {
            Ok(users) => users,
            Err(e) => {
                warn!(error = %e, "查询通知收件人失败");
                return;
            }
        };

        let recipients: Vec<i64> = users
            .into_iter()
            .map(|u| u.id)
            .filter(|id| Some(*id) != exclude)
            .collect();
        self.deliver(recipients, draft).await;
    }

    async fn deliver(&self, recipients: Vec<i64>, draft: NotificationDraft) {
        if recipients.is_empty() {
            return;
        }
        let kind = draft.kind;
        let notifications: Vec<NewNotification> = recipients
            .into_iter()
            .map(|user_id| NewNotification {
                user_id,
                draft: draft.clone(),
            })
            .collect();

        match self.repo.create_many(&notifications).await {
            Ok(count) => metrics::record_notifications(kind.as_str(), count),
            Err(e) => warn!(error = %e, recipients = notifications.len(), "通知写入失败"),
        }
    }

    pub async fn list(
        &self,
        actor: &Actor,
        unread_only: bool,
        paging: Paging,
    ) -> Result<Page<Notification>> {
        self.repo.list(actor.user_id, unread_only, paging).await
    }

    pub async fn unread_count(&self, actor: &Actor) -> Result<i64> {
        self.repo.unread_count(actor.user_id).await
    }

    pub async fn mark_read(&self, actor: &Actor, id: i64) -> Result<()> {
        if self.repo.mark_read(id, actor.user_id).await? {
            Ok(())
        } else {
            Err(CrmError::NotificationNotFound(id))
        }
    }

    pub async fn mark_all_read(&self, actor: &Actor) -> Result<u64> {
        self.repo.mark_all_read(actor.user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationKind;
    use crate::models::test_fixtures::user_with_role;
    use crate::repository::{MockNotificationRepositoryTrait, MockUserRepositoryTrait};

    fn draft() -> NotificationDraft {
        NotificationDraft::new(NotificationKind::ExtensionRequested, "延期申请", "客户申请延期 7 天")
            .for_client(42)
    }

    #[tokio::test]
    async fn test_notify_roles_excludes_actor() {
        let mut users = MockUserRepositoryTrait::new();
        users.expect_list_active_by_roles().returning(|_| {
            Ok(vec![
                user_with_role(1, UserRole::Backoffice),
                user_with_role(2, UserRole::Admin),
                user_with_role(3, UserRole::Backoffice),
            ])
        });

        let mut repo = MockNotificationRepositoryTrait::new();
        repo.expect_create_many()
            .withf(|items| {
                let ids: Vec<i64> = items.iter().map(|n| n.user_id).collect();
                ids == vec![1, 3] && items.iter().all(|n| n.draft.client_id == Some(42))
            })
            .times(1)
            .returning(|items| Ok(items.len() as u64));

        let service = NotificationService::new(Arc::new(repo), Arc::new(users));
        service
            .notify_roles(&UserRole::STAFF, Some(2), draft())
            .await;
    }

    #[tokio::test]
    async fn test_fan_out_failure_is_swallowed() {
        let mut users = MockUserRepositoryTrait::new();
        users
            .expect_list_active_by_roles()
            .returning(|_| Err(CrmError::Internal("db down".into())));
        let mut repo = MockNotificationRepositoryTrait::new();
        repo.expect_create_many().never();

        let service = NotificationService::new(Arc::new(repo), Arc::new(users));
        service.notify_roles(&UserRole::STAFF, None, draft()).await;
    }

    #[tokio::test]
    async fn test_notify_users_dedups_recipients() {
        let users = MockUserRepositoryTrait::new();
        let mut repo = MockNotificationRepositoryTrait::new();
        repo.expect_create_many()
            .withf(|items| items.len() == 2)
            .times(1)
            .returning(|_| Err(CrmError::Internal("insert failed".into())));

        let service = NotificationService::new(Arc::new(repo), Arc::new(users));
        service.notify_users(&[5, 6, 5], draft()).await;
    }

    #[tokio::test]
    async fn test_mark_read_of_foreign_notification() {
        let mut repo = MockNotificationRepositoryTrait::new();
        repo.expect_mark_read().returning(|_, _| Ok(false));

        let service =
            NotificationService::new(Arc::new(repo), Arc::new(MockUserRepositoryTrait::new()));
        let actor = user_with_role(1, UserRole::Agent).actor();
        let err = service.mark_read(&actor, 99).await.unwrap_err();
        assert!(matches!(err, CrmError::NotificationNotFound(99)));
    }
}
