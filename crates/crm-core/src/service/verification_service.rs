//! 平台登记与验证
//!
//! BetMGM 验证有冷却时间与失败次数上限，失败达到上限后平台被锁定，
//! 只能由管理员解锁。其他平台不受限制。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use crm_shared::config::BusinessConfig;
use crm_shared::observability::metrics;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, instrument, warn};

use super::{ensure_admin, ensure_money, ensure_staff, load_client};
use crate::error::{CrmError, Result};
use crate::models::{
    Actor, AttemptUpdate, Client, ClientPlatform, EventType, NewEvent, NewPlatform, NewTodo,
    NotificationDraft, NotificationKind, PlatformKind, UserRole, VerificationOutcome,
    VerificationStatus,
};
use crate::repository::{ClientRepositoryTrait, PlatformRepositoryTrait};
use crate::service::NotificationService;

/// 判断现在能否进行一次验证尝试
pub fn check_attempt_allowed(
    platform: &ClientPlatform,
    now: DateTime<Utc>,
    cooldown: Duration,
) -> Result<()> {
    match platform.status {
        VerificationStatus::Verified => return Err(CrmError::AlreadyVerified),
        VerificationStatus::Locked => return Err(CrmError::VerificationLocked),
        _ => {}
    }
    if platform.kind.has_verification_limits() {
        if let Some(last) = platform.last_attempt_at {
            let retry_at = last + cooldown;
            if now < retry_at {
                return Err(CrmError::VerificationCooldown { retry_at });
            }
        }
    }
    Ok(())
}

/// 计算一次尝试后的平台状态
///
/// attempts 只统计失败次数；有限制的平台失败次数达到上限即锁定。
pub fn next_attempt_state(
    platform: &ClientPlatform,
    outcome: &VerificationOutcome,
    now: DateTime<Utc>,
    max_attempts: i32,
) -> AttemptUpdate {
    let (status, attempts, verified_at) = match outcome {
        VerificationOutcome::Success => (VerificationStatus::Verified, platform.attempts, Some(now)),
        VerificationOutcome::Failure { .. } => {
            let attempts = platform.attempts + 1;
            let status = if platform.kind.has_verification_limits() && attempts >= max_attempts {
                VerificationStatus::Locked
            } else {
                VerificationStatus::Failed
            };
            (status, attempts, None)
        }
    };

    AttemptUpdate {
        platform_id: platform.id,
        expected_attempts: platform.attempts,
        status,
        attempts,
        attempted_at: now,
        verified_at,
    }
}

pub struct VerificationService {
    clients: Arc<dyn ClientRepositoryTrait>,
    platforms: Arc<dyn PlatformRepositoryTrait>,
    notifier: Arc<NotificationService>,
    config: BusinessConfig,
}

impl VerificationService {
    pub fn new(
        clients: Arc<dyn ClientRepositoryTrait>,
        platforms: Arc<dyn PlatformRepositoryTrait>,
        notifier: Arc<NotificationService>,
        config: BusinessConfig,
    ) -> Self {
        Self {
            clients,
            platforms,
            notifier,
            config,
        }
    }

    /// 为客户登记平台账户，同一客户每种平台只能登记一次
    #[instrument(skip(self, account_ref), fields(actor = actor.user_id))]
    pub async fn add_platform(
        &self,
        actor: &Actor,
        client_id: i64,
        kind: PlatformKind,
        account_ref: Option<String>,
    ) -> Result<ClientPlatform> {
        let client = load_client(self.clients.as_ref(), actor, client_id).await?;
        ensure_not_terminal(&client)?;

        let event = NewEvent::client(client_id, actor.user_id, EventType::PlatformAdded)
            .with_payload(json!({ "platform": kind }));
        let platform = self
            .platforms
            .create(
                &NewPlatform {
                    client_id,
                    kind,
                    account_ref: account_ref
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty()),
                },
                &event,
            )
            .await?;

        info!(client_id, platform_id = platform.id, kind = kind.as_str(), "平台已登记");
        Ok(platform)
    }

    pub async fn list_platforms(&self, actor: &Actor, client_id: i64) -> Result<Vec<ClientPlatform>> {
        load_client(self.clients.as_ref(), actor, client_id).await?;
        self.platforms.list_by_client(client_id).await
    }

    /// 业务员申请验证，通知后台处理
    #[instrument(skip(self), fields(actor = actor.user_id))]
    pub async fn request_verification(&self, actor: &Actor, platform_id: i64) -> Result<ClientPlatform> {
        let (client, platform) = self.load_platform(actor, platform_id).await?;
        ensure_not_terminal(&client)?;
        check_attempt_allowed(&platform, Utc::now(), self.cooldown())?;
        if platform.status == VerificationStatus::Pending {
            return Ok(platform);
        }

        let event = NewEvent::client(client.id, actor.user_id, EventType::VerificationRequested)
            .with_payload(json!({ "platformId": platform_id, "platform": platform.kind }));
        let updated = self
            .platforms
            .request_verification(platform_id, &event)
            .await?
            .ok_or(CrmError::ConcurrentModification)?;

        self.notifier
            .notify_roles(
                &UserRole::STAFF,
                Some(actor.user_id),
                NotificationDraft::new(
                    NotificationKind::VerificationRequested,
                    "平台验证申请",
                    format!("{} 申请验证 {}", client.full_name(), platform.kind.display_name()),
                )
                .for_client(client.id),
            )
            .await;

        Ok(updated)
    }

    /// 后台记录一次验证结果
    #[instrument(skip(self, outcome), fields(actor = actor.user_id, outcome = outcome.as_str()))]
    pub async fn record_attempt(
        &self,
        actor: &Actor,
        platform_id: i64,
        outcome: VerificationOutcome,
    ) -> Result<ClientPlatform> {
        ensure_staff(actor)?;
        let (client, platform) = self.load_platform(actor, platform_id).await?;
        ensure_not_terminal(&client)?;

        let now = Utc::now();
        check_attempt_allowed(&platform, now, self.cooldown())?;
        let update = next_attempt_state(&platform, &outcome, now, self.config.betmgm_max_attempts);

        let note = match &outcome {
            VerificationOutcome::Failure { note } => note.clone(),
            VerificationOutcome::Success => None,
        };
        let event = NewEvent::client(client.id, actor.user_id, EventType::VerificationAttempted)
            .with_payload(json!({
                "platformId": platform_id,
                "platform": platform.kind,
                "outcome": outcome.as_str(),
                "attempts": update.attempts,
                "status": update.status,
                "note": note,
            }));

        let locked = update.status == VerificationStatus::Locked;
        let todo = locked.then(|| NewTodo {
            title: format!("{} 验证已锁定", platform.kind.display_name()),
            description: Some(format!(
                "客户 {} 的 {} 验证失败 {} 次，需联系客户核实后申请解锁",
                client.full_name(),
                platform.kind.display_name(),
                update.attempts
            )),
            assignee_id: client.agent_id,
            client_id: Some(client.id),
            due_at: None,
            created_by: None,
        });

        let updated = self
            .platforms
            .record_attempt(&update, &event, todo)
            .await?
            .ok_or(CrmError::ConcurrentModification)?;

        metrics::record_verification_attempt(platform.kind.as_str(), outcome.as_str());
        self.notify_outcome(&client, &updated, locked).await;
        Ok(updated)
    }

    /// 管理员解锁被锁定的平台
    #[instrument(skip(self), fields(actor = actor.user_id))]
    pub async fn unlock(&self, actor: &Actor, platform_id: i64) -> Result<ClientPlatform> {
        ensure_admin(actor)?;
        let (client, platform) = self.load_platform(actor, platform_id).await?;
        if platform.status != VerificationStatus::Locked {
            return Err(CrmError::InvalidStatusTransition {
                entity: "平台",
                from: platform.status.as_str().to_string(),
                to: VerificationStatus::Failed.as_str().to_string(),
            });
        }

        let event = NewEvent::client(client.id, actor.user_id, EventType::PlatformUnlocked)
            .with_payload(json!({ "platformId": platform_id }));
        let updated = self
            .platforms
            .unlock(platform_id, &event)
            .await?
            .ok_or(CrmError::ConcurrentModification)?;
        info!(platform_id, "平台验证已解锁");
        Ok(updated)
    }

    /// 后台更新平台余额
    #[instrument(skip(self), fields(actor = actor.user_id))]
    pub async fn update_balance(
        &self,
        actor: &Actor,
        platform_id: i64,
        balance: Decimal,
    ) -> Result<ClientPlatform> {
        ensure_staff(actor)?;
        ensure_money(balance, "余额")?;
        let (client, platform) = self.load_platform(actor, platform_id).await?;
        if client.status.is_terminal() {
            return Err(CrmError::InvalidStatusTransition {
                entity: "客户",
                from: client.status.as_str().to_string(),
                to: "balance_updated".to_string(),
            });
        }

        let event = NewEvent::client(client.id, actor.user_id, EventType::BalanceUpdated)
            .with_payload(json!({
                "platformId": platform_id,
                "from": platform.balance,
                "to": balance,
            }));
        self.platforms
            .update_balance(platform_id, balance, &event)
            .await?
            .ok_or(CrmError::ConcurrentModification)
    }

    fn cooldown(&self) -> Duration {
        Duration::hours(self.config.betmgm_cooldown_hours)
    }

    async fn load_platform(&self, actor: &Actor, platform_id: i64) -> Result<(Client, ClientPlatform)> {
        let platform = self
            .platforms
            .get(platform_id)
            .await?
            .ok_or(CrmError::PlatformNotFound(platform_id))?;
        let client = load_client(self.clients.as_ref(), actor, platform.client_id)
            .await
            .map_err(|e| match e {
                CrmError::ClientNotFound(_) => CrmError::PlatformNotFound(platform_id),
                other => other,
            })?;
        Ok((client, platform))
    }

    async fn notify_outcome(&self, client: &Client, platform: &ClientPlatform, locked: bool) {
        let name = platform.kind.display_name();
        let draft = match platform.status {
            VerificationStatus::Verified => NotificationDraft::new(
                NotificationKind::VerificationSucceeded,
                "平台验证通过",
                format!("{} 的 {} 已验证通过", client.full_name(), name),
            ),
            _ if locked => {
                warn!(platform_id = platform.id, attempts = platform.attempts, "平台验证已锁定");
                let draft = NotificationDraft::new(
                    NotificationKind::VerificationLocked,
                    "平台验证已锁定",
                    format!("{} 的 {} 连续验证失败，已锁定", client.full_name(), name),
                )
                .for_client(client.id);
                self.notifier
                    .notify_roles(&UserRole::STAFF, None, draft.clone())
                    .await;
                draft
            }
            _ => NotificationDraft::new(
                NotificationKind::VerificationFailed,
                "平台验证失败",
                format!(
                    "{} 的 {} 验证失败（第 {} 次）",
                    client.full_name(),
                    name,
                    platform.attempts
                ),
            ),
        };
        self.notifier
            .notify_user(client.agent_id, draft.for_client(client.id))
            .await;
    }
}

fn ensure_not_terminal(client: &Client) -> Result<()> {
    if client.status.is_terminal() {
        return Err(CrmError::InvalidStatusTransition {
            entity: "客户",
            from: client.status.as_str().to_string(),
            to: "platform_changed".to_string(),
        });
    }
    Ok(())
}
