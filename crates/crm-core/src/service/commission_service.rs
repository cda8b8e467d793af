//! 佣金奖金池
//!
//! 奖金池分两部分：直接奖金全部给成交业务员；星级池按上级链上
//! 各业务员的星级加权分配。金额截断到分，零头给星级最高者。

use std::sync::Arc;

use crm_shared::config::BusinessConfig;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument};

use super::{ensure_money, ensure_staff, load_client, truncate_cents};
use crate::error::{CrmError, Result};
use crate::models::{
    Actor, AllocationKind, BonusAllocation, BonusPool, ClientStatus, EventType, NewAllocation,
    NewBonusPool, NewEvent, NotificationDraft, NotificationKind, Page, Paging, PoolFilter,
    PoolStatus, User, UserRole,
};
use crate::repository::{BonusRepositoryTrait, ClientRepositoryTrait, UserRepositoryTrait};
use crate::service::NotificationService;

/// 计算奖金池分配行
///
/// `chain` 以成交业务员开头，依次为各级上级。星级为 0 或已停用的用户不参与
/// 星级池；无人参与时星级池记为公司留存。金额为零的行不生成，
/// 各行之和恒等于奖金池总额。
pub fn compute_allocations(pool: &BonusPool, chain: &[User]) -> Vec<NewAllocation> {
    let mut lines = Vec::new();

    if !pool.direct_amount.is_zero() {
        let closer_level = chain
            .first()
            .filter(|u| u.id == pool.closer_id)
            .map_or(0, |u| u.star_level);
        lines.push(NewAllocation {
            agent_id: Some(pool.closer_id),
            kind: AllocationKind::Direct,
            star_level: closer_level,
            amount: pool.direct_amount,
        });
    }

    let star_pool = pool.star_pool();
    if star_pool.is_zero() {
        return lines;
    }

    let eligible: Vec<&User> = chain
        .iter()
        .filter(|u| u.star_level > 0 && u.is_active())
        .collect();
    let total_weight: i32 = eligible.iter().map(|u| u.star_level).sum();
    if total_weight == 0 {
        lines.push(NewAllocation {
            agent_id: None,
            kind: AllocationKind::House,
            star_level: 0,
            amount: star_pool,
        });
        return lines;
    }

    let mut shares: Vec<NewAllocation> = eligible
        .iter()
        .map(|u| NewAllocation {
            agent_id: Some(u.id),
            kind: AllocationKind::Star,
            star_level: u.star_level,
            amount: truncate_cents(
                star_pool * Decimal::from(u.star_level) / Decimal::from(total_weight),
            ),
        })
        .collect();

    let distributed: Decimal = shares.iter().map(|s| s.amount).sum();
    let remainder = star_pool - distributed;
    if !remainder.is_zero() {
        // 星级最高者得零头，同级取链上靠前者
        let top = shares
            .iter()
            .enumerate()
            .fold(0, |best, (i, s)| if s.star_level > shares[best].star_level { i } else { best });
        shares[top].amount += remainder;
    }

    lines.extend(shares.into_iter().filter(|s| !s.amount.is_zero()));
    lines
}

/// 奖金池及其分配明细
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolDetail {
    #[serde(flatten)]
    pub pool: BonusPool,
    pub allocations: Vec<BonusAllocation>,
}

#[derive(Debug, Clone)]
pub struct CreatePoolInput {
    pub client_id: i64,
    /// 缺省为客户当前的业务员
    pub closer_id: Option<i64>,
    pub total_amount: Decimal,
    pub direct_amount: Decimal,
    pub note: Option<String>,
}

pub struct CommissionService {
    clients: Arc<dyn ClientRepositoryTrait>,
    users: Arc<dyn UserRepositoryTrait>,
    bonus: Arc<dyn BonusRepositoryTrait>,
    notifier: Arc<NotificationService>,
    config: BusinessConfig,
}

impl CommissionService {
    pub fn new(
        clients: Arc<dyn ClientRepositoryTrait>,
        users: Arc<dyn UserRepositoryTrait>,
        bonus: Arc<dyn BonusRepositoryTrait>,
        notifier: Arc<NotificationService>,
        config: BusinessConfig,
    ) -> Self {
        Self {
            clients,
            users,
            bonus,
            notifier,
            config,
        }
    }

    #[instrument(skip(self, input), fields(actor = actor.user_id, client_id = input.client_id))]
    pub async fn create_pool(&self, actor: &Actor, input: CreatePoolInput) -> Result<BonusPool> {
        ensure_staff(actor)?;
        ensure_money(input.total_amount, "奖金总额")?;
        ensure_money(input.direct_amount, "直接奖金")?;
        if input.total_amount.is_zero() {
            return Err(CrmError::InvalidAmount("奖金总额必须大于零".to_string()));
        }
        if input.direct_amount > input.total_amount {
            return Err(CrmError::InvalidAmount("直接奖金不能超过奖金总额".to_string()));
        }

        let client = load_client(self.clients.as_ref(), actor, input.client_id).await?;
        if !matches!(client.status, ClientStatus::Active | ClientStatus::Closed) {
            return Err(CrmError::InvalidStatusTransition {
                entity: "客户",
                from: client.status.as_str().to_string(),
                to: "bonus_pool".to_string(),
            });
        }
        let closer_id = input.closer_id.unwrap_or(client.agent_id);
        let closer = self
            .users
            .get(closer_id)
            .await?
            .ok_or(CrmError::UserNotFound(closer_id))?;
        if closer.role != UserRole::Agent {
            return Err(CrmError::Validation("成交人必须是业务员".to_string()));
        }

        let event = NewEvent::client(client.id, actor.user_id, EventType::BonusPoolCreated)
            .with_payload(json!({
                "closerId": closer.id,
                "totalAmount": input.total_amount,
                "directAmount": input.direct_amount,
            }));
        let pool = self
            .bonus
            .create_pool(
                &NewBonusPool {
                    client_id: client.id,
                    closer_id: closer.id,
                    total_amount: input.total_amount,
                    direct_amount: input.direct_amount,
                    note: input.note,
                    created_by: actor.user_id,
                },
                &event,
            )
            .await?;

        info!(pool_id = pool.id, "奖金池已创建");
        Ok(pool)
    }

    /// 按当前上级链与星级生成分配行，Draft -> Allocated
    #[instrument(skip(self), fields(actor = actor.user_id))]
    pub async fn allocate(&self, actor: &Actor, pool_id: i64) -> Result<PoolDetail> {
        ensure_staff(actor)?;
        let pool = self.load_pool(pool_id).await?;
        ensure_pool_status(&pool, PoolStatus::Draft, PoolStatus::Allocated)?;

        let chain = self
            .users
            .upline_chain(pool.closer_id, self.config.upline_max_depth)
            .await?;
        let lines = compute_allocations(&pool, &chain);

        let event = NewEvent::client(pool.client_id, actor.user_id, EventType::BonusAllocated)
            .with_payload(json!({
                "poolId": pool_id,
                "lines": lines.iter().map(|l| json!({
                    "agentId": l.agent_id,
                    "kind": l.kind,
                    "amount": l.amount,
                })).collect::<Vec<_>>(),
            }));
        let pool = self
            .bonus
            .save_allocations(pool_id, &lines, &event)
            .await?
            .ok_or(CrmError::ConcurrentModification)?;
        let allocations = self.bonus.list_allocations(pool_id).await?;

        info!(pool_id, lines = allocations.len(), "奖金池已分配");
        Ok(PoolDetail { pool, allocations })
    }

    /// 确认发放，Allocated -> Settled
    #[instrument(skip(self), fields(actor = actor.user_id))]
    pub async fn settle(&self, actor: &Actor, pool_id: i64) -> Result<PoolDetail> {
        ensure_staff(actor)?;
        let pool = self.load_pool(pool_id).await?;
        ensure_pool_status(&pool, PoolStatus::Allocated, PoolStatus::Settled)?;

        let event = NewEvent::client(pool.client_id, actor.user_id, EventType::BonusSettled)
            .with_payload(json!({ "poolId": pool_id }));
        let pool = self
            .bonus
            .settle(pool_id, &event)
            .await?
            .ok_or(CrmError::ConcurrentModification)?;
        let allocations = self.bonus.list_allocations(pool_id).await?;

        for allocation in &allocations {
            if let Some(agent_id) = allocation.agent_id {
                self.notifier
                    .notify_user(
                        agent_id,
                        NotificationDraft::new(
                            NotificationKind::BonusSettled,
                            "奖金已发放",
                            format!("奖金池 #{pool_id} 已结算，你的奖金为 {}", allocation.amount),
                        )
                        .for_client(pool.client_id),
                    )
                    .await;
            }
        }

        Ok(PoolDetail { pool, allocations })
    }

    pub async fn get_pool(&self, actor: &Actor, pool_id: i64) -> Result<PoolDetail> {
        ensure_staff(actor)?;
        let pool = self.load_pool(pool_id).await?;
        let allocations = self.bonus.list_allocations(pool_id).await?;
        Ok(PoolDetail { pool, allocations })
    }

    pub async fn list_pools(
        &self,
        actor: &Actor,
        filter: PoolFilter,
        paging: Paging,
    ) -> Result<Page<BonusPool>> {
        ensure_staff(actor)?;
        self.bonus.list_pools(&filter, paging).await
    }

    async fn load_pool(&self, pool_id: i64) -> Result<BonusPool> {
        self.bonus
            .get_pool(pool_id)
            .await?
            .ok_or(CrmError::BonusPoolNotFound(pool_id))
    }
}

fn ensure_pool_status(pool: &BonusPool, expected: PoolStatus, to: PoolStatus) -> Result<()> {
    if pool.status == expected {
        Ok(())
    } else {
        Err(CrmError::InvalidStatusTransition {
            entity: "奖金池",
            from: pool.status.as_str().to_string(),
            to: to.as_str().to_string(),
        })
    }
}
