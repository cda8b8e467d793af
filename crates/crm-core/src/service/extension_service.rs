//! 入驻期限延期申请
//!
//! 每个客户最多延期 `max_extensions` 次，同一时间只能有一个待审批申请。
//! 审批通过后新期限 = 原期限 + 申请天数。

use std::sync::Arc;

use chrono::Duration;
use crm_shared::config::BusinessConfig;
use serde_json::json;
use tracing::{info, instrument};

use super::{ensure_staff, load_client, required_text};
use crate::error::{CrmError, Result};
use crate::models::{
    Actor, Client, EventType, ExtensionApproval, ExtensionFilter, ExtensionRequest,
    ExtensionStatus, NewEvent, NewExtensionRequest, NotificationDraft, NotificationKind, Page,
    Paging, UserRole,
};
use crate::repository::{ClientRepositoryTrait, ExtensionRepositoryTrait};
use crate::service::NotificationService;

pub struct ExtensionService {
    clients: Arc<dyn ClientRepositoryTrait>,
    extensions: Arc<dyn ExtensionRepositoryTrait>,
    notifier: Arc<NotificationService>,
    config: BusinessConfig,
}

impl ExtensionService {
    pub fn new(
        clients: Arc<dyn ClientRepositoryTrait>,
        extensions: Arc<dyn ExtensionRepositoryTrait>,
        notifier: Arc<NotificationService>,
        config: BusinessConfig,
    ) -> Self {
        Self {
            clients,
            extensions,
            notifier,
            config,
        }
    }

    #[instrument(skip(self, reason), fields(actor = actor.user_id))]
    pub async fn request(
        &self,
        actor: &Actor,
        client_id: i64,
        days: i32,
        reason: &str,
    ) -> Result<ExtensionRequest> {
        let reason = required_text(reason, "延期原因")?;
        if !(1..=self.config.extension_max_days).contains(&days) {
            return Err(CrmError::Validation(format!(
                "延期天数必须在 1-{} 之间",
                self.config.extension_max_days
            )));
        }

        let client = load_client(self.clients.as_ref(), actor, client_id).await?;
        self.ensure_extendable(&client)?;
        if self.extensions.has_pending(client_id).await? {
            return Err(CrmError::ExtensionAlreadyPending);
        }

        let event = NewEvent::client(client_id, actor.user_id, EventType::ExtensionRequested)
            .with_payload(json!({ "days": days, "reason": reason }));
        let request = self
            .extensions
            .create(
                &NewExtensionRequest {
                    client_id,
                    requested_by: actor.user_id,
                    requested_days: days,
                    reason,
                },
                &event,
            )
            .await?;

        self.notifier
            .notify_roles(
                &UserRole::STAFF,
                Some(actor.user_id),
                NotificationDraft::new(
                    NotificationKind::ExtensionRequested,
                    "延期申请",
                    format!("{} 申请延期 {} 天", client.full_name(), days),
                )
                .for_client(client_id),
            )
            .await;

        info!(client_id, request_id = request.id, days, "延期申请已提交");
        Ok(request)
    }

    pub async fn get(&self, actor: &Actor, id: i64) -> Result<ExtensionRequest> {
        let request = self
            .extensions
            .get(id)
            .await?
            .ok_or(CrmError::ExtensionNotFound(id))?;
        load_client(self.clients.as_ref(), actor, request.client_id)
            .await
            .map_err(|e| if e.is_not_found() { CrmError::ExtensionNotFound(id) } else { e })?;
        Ok(request)
    }

    pub async fn list(
        &self,
        actor: &Actor,
        mut filter: ExtensionFilter,
        paging: Paging,
    ) -> Result<Page<ExtensionRequest>> {
        if let Some(agent_id) = actor.agent_scope() {
            filter.agent_id = Some(agent_id);
        }
        self.extensions.list(&filter, paging).await
    }

    /// 审批通过，延长客户的入驻期限
    #[instrument(skip(self, note), fields(actor = actor.user_id))]
    pub async fn approve(
        &self,
        actor: &Actor,
        id: i64,
        note: Option<String>,
    ) -> Result<ExtensionRequest> {
        ensure_staff(actor)?;
        let request = self.load_pending(id).await?;
        let client = load_client(self.clients.as_ref(), actor, request.client_id).await?;
        self.ensure_extendable(&client)?;

        let previous_deadline = client.intake_deadline;
        let new_deadline = previous_deadline + Duration::days(i64::from(request.requested_days));
        let event = NewEvent::client(client.id, actor.user_id, EventType::ExtensionApproved)
            .with_payload(json!({
                "requestId": id,
                "previousDeadline": previous_deadline,
                "newDeadline": new_deadline,
                "extensionCount": client.extension_count + 1,
            }));
        let approval = ExtensionApproval {
            request_id: id,
            client_id: client.id,
            reviewer_id: actor.user_id,
            note,
            previous_deadline,
            new_deadline,
            max_extensions: self.config.max_extensions,
        };
        let approved = self
            .extensions
            .approve(&approval, &event)
            .await?
            .ok_or(CrmError::ConcurrentModification)?;

        self.notifier
            .notify_user(
                request.requested_by,
                NotificationDraft::new(
                    NotificationKind::ExtensionApproved,
                    "延期申请已通过",
                    format!(
                        "{} 的入驻期限已延至 {}",
                        client.full_name(),
                        new_deadline.format("%Y-%m-%d")
                    ),
                )
                .for_client(client.id),
            )
            .await;

        info!(request_id = id, client_id = client.id, %new_deadline, "延期申请已通过");
        Ok(approved)
    }

    #[instrument(skip(self, note), fields(actor = actor.user_id))]
    pub async fn reject(&self, actor: &Actor, id: i64, note: &str) -> Result<ExtensionRequest> {
        ensure_staff(actor)?;
        let note = required_text(note, "驳回说明")?;
        let request = self.load_pending(id).await?;

        let event = NewEvent::client(request.client_id, actor.user_id, EventType::ExtensionRejected)
            .with_payload(json!({ "requestId": id, "note": note }));
        let rejected = self
            .extensions
            .reject(id, actor.user_id, &note, &event)
            .await?
            .ok_or(CrmError::ConcurrentModification)?;

        self.notifier
            .notify_user(
                request.requested_by,
                NotificationDraft::new(
                    NotificationKind::ExtensionRejected,
                    "延期申请被驳回",
                    note,
                )
                .for_client(request.client_id),
            )
            .await;

        Ok(rejected)
    }

    async fn load_pending(&self, id: i64) -> Result<ExtensionRequest> {
        let request = self
            .extensions
            .get(id)
            .await?
            .ok_or(CrmError::ExtensionNotFound(id))?;
        if request.status != ExtensionStatus::Pending {
            return Err(CrmError::InvalidStatusTransition {
                entity: "延期申请",
                from: request.status.as_str().to_string(),
                to: "reviewed".to_string(),
            });
        }
        Ok(request)
    }

    fn ensure_extendable(&self, client: &Client) -> Result<()> {
        if !client.status.is_intake_phase() {
            return Err(CrmError::ExtensionNotAllowed(client.status.as_str().to_string()));
        }
        if client.extension_count >= self.config.max_extensions {
            return Err(CrmError::ExtensionLimitReached {
                max: self.config.max_extensions,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClientStatus;
    use crate::models::test_fixtures::{agent, client_in, extension, user_with_role};
    use crate::repository::{
        MockClientRepositoryTrait, MockExtensionRepositoryTrait, MockNotificationRepositoryTrait,
        MockUserRepositoryTrait,
    };

    fn notifier() -> Arc<NotificationService> {
        let mut notifications = MockNotificationRepositoryTrait::new();
        notifications
            .expect_create_many()
            .returning(|items| Ok(items.len() as u64));
        let mut users = MockUserRepositoryTrait::new();
        users
            .expect_list_active_by_roles()
            .returning(|_| Ok(vec![user_with_role(900, UserRole::Backoffice)]));
        Arc::new(NotificationService::new(Arc::new(notifications), Arc::new(users)))
    }

    fn clients_with(extension_count: i32, status: ClientStatus) -> MockClientRepositoryTrait {
        let mut clients = MockClientRepositoryTrait::new();
        clients.expect_get().returning(move |id| {
            let mut client = client_in(id, 7, status);
            client.extension_count = extension_count;
            Ok(Some(client))
        });
        clients
    }

    fn service(
        clients: MockClientRepositoryTrait,
        extensions: MockExtensionRepositoryTrait,
    ) -> ExtensionService {
        ExtensionService::new(
            Arc::new(clients),
            Arc::new(extensions),
            notifier(),
            BusinessConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_request_refused_after_three_extensions() {
        let actor = agent(7, 0, None).actor();
        let err = service(clients_with(3, ClientStatus::Intake), MockExtensionRepositoryTrait::new())
            .request(&actor, 1, 7, "证件补寄")
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::ExtensionLimitReached { max: 3 }));
    }

    #[tokio::test]
    async fn test_request_refused_when_pending_exists() {
        let mut extensions = MockExtensionRepositoryTrait::new();
        extensions.expect_has_pending().returning(|_| Ok(true));
        extensions.expect_create().never();

        let actor = agent(7, 0, None).actor();
        let err = service(clients_with(1, ClientStatus::Intake), extensions)
            .request(&actor, 1, 7, "证件补寄")
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::ExtensionAlreadyPending));
    }

    #[tokio::test]
    async fn test_request_validates_days_and_status() {
        let actor = agent(7, 0, None).actor();
        let svc = service(clients_with(0, ClientStatus::Active), MockExtensionRepositoryTrait::new());

        assert!(matches!(
            svc.request(&actor, 1, 0, "原因").await,
            Err(CrmError::Validation(_))
        ));
        assert!(matches!(
            svc.request(&actor, 1, 15, "原因").await,
            Err(CrmError::Validation(_))
        ));
        assert!(matches!(
            svc.request(&actor, 1, 5, "原因").await,
            Err(CrmError::ExtensionNotAllowed(_))
        ));
    }

    #[tokio::test]
    async fn test_request_created() {
        let mut extensions = MockExtensionRepositoryTrait::new();
        extensions.expect_has_pending().returning(|_| Ok(false));
        extensions
            .expect_create()
            .withf(|r, e| r.requested_days == 7 && r.reason == "证件补寄" && e.client_id == Some(1))
            .returning(|r, _| Ok(extension(5, r.client_id, r.requested_by, r.requested_days)));

        let actor = agent(7, 0, None).actor();
        let request = service(clients_with(2, ClientStatus::PendingReview), extensions)
            .request(&actor, 1, 7, " 证件补寄 ")
            .await
            .unwrap();
        assert_eq!(request.id, 5);
    }

    #[tokio::test]
    async fn test_approve_extends_from_previous_deadline() {
        let mut extensions = MockExtensionRepositoryTrait::new();
        extensions
            .expect_get()
            .returning(|id| Ok(Some(extension(id, 1, 7, 10))));
        extensions
            .expect_approve()
            .withf(|a, _| {
                a.new_deadline - a.previous_deadline == Duration::days(10) && a.max_extensions == 3
            })
            .times(1)
            .returning(|a, _| {
                let mut request = extension(a.request_id, a.client_id, 7, 10);
                request.status = ExtensionStatus::Approved;
                request.new_deadline = Some(a.new_deadline);
                Ok(Some(request))
            });

        let staff = user_with_role(1, UserRole::Backoffice).actor();
        let approved = service(clients_with(2, ClientStatus::Intake), extensions)
            .approve(&staff, 5, None)
            .await
            .unwrap();
        assert_eq!(approved.status, ExtensionStatus::Approved);
    }

    #[tokio::test]
    async fn test_approve_refused_when_limit_reached() {
        let mut extensions = MockExtensionRepositoryTrait::new();
        extensions
            .expect_get()
            .returning(|id| Ok(Some(extension(id, 1, 7, 5))));
        extensions.expect_approve().never();

        let staff = user_with_role(1, UserRole::Backoffice).actor();
        let err = service(clients_with(3, ClientStatus::Intake), extensions)
            .approve(&staff, 5, Some("补件".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::ExtensionLimitReached { max: 3 }));
        assert_eq!(err.code(), "EXTENSION_LIMIT_REACHED");
    }

    #[tokio::test]
    async fn test_approve_conflict_reported() {
        let mut extensions = MockExtensionRepositoryTrait::new();
        extensions
            .expect_get()
            .returning(|id| Ok(Some(extension(id, 1, 7, 10))));
        extensions.expect_approve().returning(|_, _| Ok(None));

        let staff = user_with_role(1, UserRole::Admin).actor();
        let err = service(clients_with(2, ClientStatus::Intake), extensions)
            .approve(&staff, 5, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::ConcurrentModification));
    }

    #[tokio::test]
    async fn test_reviewed_request_cannot_be_rejected() {
        let mut extensions = MockExtensionRepositoryTrait::new();
        extensions.expect_get().returning(|id| {
            let mut request = extension(id, 1, 7, 3);
            request.status = ExtensionStatus::Approved;
            Ok(Some(request))
        });

        let staff = user_with_role(1, UserRole::Backoffice).actor();
        let err = service(MockClientRepositoryTrait::new(), extensions)
            .reject(&staff, 5, "不予延期")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_STATUS_TRANSITION");
    }
}
