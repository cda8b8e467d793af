//! 分润规则与结算
//!
//! 规则由若干明细组成，百分比之和必须恰好为 100。结算时按客户当前
//! 规则拆分利润，每行截断到分，零头归百分比最高的一行。

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, instrument};

use super::{ensure_admin, ensure_money, ensure_staff, load_client, required_text, truncate_cents};
use crate::error::{CrmError, Result};
use crate::models::{
    Actor, ClientStatus, EventType, NewEvent, NewProfitShareRule, NewRuleDetail, NewSettlement,
    NewSettlementLine, NotificationDraft, NotificationKind, Page, Paging, ProfitShareDetail,
    ProfitShareRule, Settlement, SettlementFilter, SettlementStatus,
};
use crate::repository::{ClientRepositoryTrait, ProfitShareRepositoryTrait, UserRepositoryTrait};
use crate::service::NotificationService;

const MAX_RULE_LINES: usize = 10;

/// 校验规则明细
pub fn validate_rule_details(details: &[NewRuleDetail]) -> Result<()> {
    let invalid = |msg: String| Err(CrmError::InvalidProfitShareRule(msg));

    if details.is_empty() || details.len() > MAX_RULE_LINES {
        return invalid(format!("明细行数必须在 1-{MAX_RULE_LINES} 之间"));
    }

    let hundred = Decimal::ONE_HUNDRED;
    let mut recipients = HashSet::new();
    for detail in details {
        if detail.label.trim().is_empty() {
            return invalid("明细名称不能为空".to_string());
        }
        let pct = detail.percentage;
        if pct <= Decimal::ZERO || pct > hundred {
            return invalid(format!("{}: 百分比必须大于 0 且不超过 100", detail.label));
        }
        if pct.normalize().scale() > 2 {
            return invalid(format!("{}: 百分比最多两位小数", detail.label));
        }
        if let Some(recipient) = detail.recipient_id {
            if !recipients.insert(recipient) {
                return invalid(format!("收款人 {recipient} 重复出现"));
            }
        }
    }

    let total: Decimal = details.iter().map(|d| d.percentage).sum();
    if total != hundred {
        return invalid(format!("百分比合计必须为 100，当前为 {total}"));
    }
    Ok(())
}

/// 按规则拆分利润，各行之和等于利润总额
pub fn split_profit(profit: Decimal, details: &[ProfitShareDetail]) -> Vec<NewSettlementLine> {
    let mut lines: Vec<NewSettlementLine> = details
        .iter()
        .map(|d| NewSettlementLine {
            recipient_id: d.recipient_id,
            label: d.label.clone(),
            percentage: d.percentage,
            amount: truncate_cents(profit * d.percentage / Decimal::ONE_HUNDRED),
        })
        .collect();

    let distributed: Decimal = lines.iter().map(|l| l.amount).sum();
    let remainder = profit - distributed;
    if !remainder.is_zero() && !lines.is_empty() {
        let top = lines.iter().enumerate().fold(0, |best, (i, l)| {
            if l.percentage > lines[best].percentage { i } else { best }
        });
        lines[top].amount += remainder;
    }
    lines
}

#[derive(Debug, Clone)]
pub struct CreateSettlementInput {
    pub client_id: i64,
    pub period_label: String,
    pub profit_amount: Decimal,
    /// 缺省使用客户已指定的规则
    pub rule_id: Option<i64>,
}

pub struct ProfitShareService {
    clients: Arc<dyn ClientRepositoryTrait>,
    users: Arc<dyn UserRepositoryTrait>,
    repo: Arc<dyn ProfitShareRepositoryTrait>,
    notifier: Arc<NotificationService>,
}

impl ProfitShareService {
    pub fn new(
        clients: Arc<dyn ClientRepositoryTrait>,
        users: Arc<dyn UserRepositoryTrait>,
        repo: Arc<dyn ProfitShareRepositoryTrait>,
        notifier: Arc<NotificationService>,
    ) -> Self {
        Self {
            clients,
            users,
            repo,
            notifier,
        }
    }

    #[instrument(skip(self, description, details), fields(actor = actor.user_id))]
    pub async fn create_rule(
        &self,
        actor: &Actor,
        name: &str,
        description: Option<String>,
        details: Vec<NewRuleDetail>,
    ) -> Result<ProfitShareRule> {
        ensure_admin(actor)?;
        let name = required_text(name, "规则名称")?;
        let details: Vec<NewRuleDetail> = details
            .into_iter()
            .map(|d| NewRuleDetail {
                label: d.label.trim().to_string(),
                ..d
            })
            .collect();
        validate_rule_details(&details)?;

        let recipient_ids: Vec<i64> = details.iter().filter_map(|d| d.recipient_id).collect();
        if !recipient_ids.is_empty() {
            let found = self.users.get_many(&recipient_ids).await?;
            if let Some(missing) = recipient_ids
                .iter()
                .find(|id| !found.iter().any(|u| u.id == **id))
            {
                return Err(CrmError::UserNotFound(*missing));
            }
        }

        let rule = self
            .repo
            .create_rule(&NewProfitShareRule {
                name,
                description,
                created_by: actor.user_id,
                details,
            })
            .await?;
        info!(rule_id = rule.id, lines = rule.details.len(), "分润规则已创建");
        Ok(rule)
    }

    pub async fn get_rule(&self, actor: &Actor, id: i64) -> Result<ProfitShareRule> {
        ensure_staff(actor)?;
        self.repo
            .get_rule(id)
            .await?
            .ok_or(CrmError::ProfitShareRuleNotFound(id))
    }

    pub async fn list_rules(&self, actor: &Actor, active: Option<bool>) -> Result<Vec<ProfitShareRule>> {
        ensure_staff(actor)?;
        self.repo.list_rules(active).await
    }

    /// 停用后不能再分配给客户，已有结算不受影响
    pub async fn set_rule_active(&self, actor: &Actor, id: i64, active: bool) -> Result<ProfitShareRule> {
        ensure_admin(actor)?;
        let rule = self
            .repo
            .set_rule_active(id, active)
            .await?
            .ok_or(CrmError::ProfitShareRuleNotFound(id))?;
        info!(rule_id = id, active, "分润规则状态已更新");
        Ok(rule)
    }

    #[instrument(skip(self, input), fields(actor = actor.user_id, client_id = input.client_id))]
    pub async fn create_settlement(
        &self,
        actor: &Actor,
        input: CreateSettlementInput,
    ) -> Result<Settlement> {
        ensure_staff(actor)?;
        let period_label = required_text(&input.period_label, "结算周期")?;
        ensure_money(input.profit_amount, "利润")?;
        if input.profit_amount.is_zero() {
            return Err(CrmError::InvalidAmount("利润必须大于零".to_string()));
        }

        let client = load_client(self.clients.as_ref(), actor, input.client_id).await?;
        // 入驻中与已驳回的客户不可结算
        if matches!(client.status, ClientStatus::Intake | ClientStatus::Rejected) {
            return Err(CrmError::InvalidStatusTransition {
                entity: "客户",
                from: client.status.as_str().to_string(),
                to: "settlement".to_string(),
            });
        }
        let rule_id = input
            .rule_id
            .or(client.profit_share_rule_id)
            .ok_or(CrmError::NoProfitShareRule)?;
        let rule = self
            .repo
            .get_rule(rule_id)
            .await?
            .ok_or(CrmError::ProfitShareRuleNotFound(rule_id))?;
        if !rule.active {
            return Err(CrmError::ProfitShareRuleInactive(rule_id));
        }

        let lines = split_profit(input.profit_amount, &rule.details);
        let event = NewEvent::client(client.id, actor.user_id, EventType::SettlementCreated)
            .with_payload(json!({
                "ruleId": rule_id,
                "period": period_label,
                "profitAmount": input.profit_amount,
            }));
        let settlement = self
            .repo
            .create_settlement(
                &NewSettlement {
                    client_id: client.id,
                    rule_id,
                    period_label,
                    profit_amount: input.profit_amount,
                    created_by: actor.user_id,
                },
                &lines,
                &event,
            )
            .await?;

        info!(settlement_id = settlement.id, "分润结算单已创建");
        Ok(settlement)
    }

    #[instrument(skip(self), fields(actor = actor.user_id))]
    pub async fn confirm_settlement(&self, actor: &Actor, id: i64) -> Result<Settlement> {
        ensure_staff(actor)?;
        let current = self.load_settlement(id).await?;
        if current.status != SettlementStatus::Pending {
            return Err(CrmError::InvalidStatusTransition {
                entity: "结算单",
                from: current.status.as_str().to_string(),
                to: SettlementStatus::Confirmed.as_str().to_string(),
            });
        }

        let event = NewEvent::client(current.client_id, actor.user_id, EventType::SettlementConfirmed)
            .with_payload(json!({ "settlementId": id }));
        let settlement = self
            .repo
            .confirm_settlement(id, actor.user_id, &event)
            .await?
            .ok_or(CrmError::ConcurrentModification)?;

        for line in &current.lines {
            if let Some(recipient) = line.recipient_id {
                self.notifier
                    .notify_user(
                        recipient,
                        NotificationDraft::new(
                            NotificationKind::SettlementConfirmed,
                            "分润已确认",
                            format!("{} 分润 {}（{}%）", settlement.period_label, line.amount, line.percentage),
                        )
                        .for_client(settlement.client_id),
                    )
                    .await;
            }
        }
        Ok(settlement)
    }

    pub async fn get_settlement(&self, actor: &Actor, id: i64) -> Result<Settlement> {
        ensure_staff(actor)?;
        self.load_settlement(id).await
    }

    pub async fn list_settlements(
        &self,
        actor: &Actor,
        filter: SettlementFilter,
        paging: Paging,
    ) -> Result<Page<Settlement>> {
        ensure_staff(actor)?;
        self.repo.list_settlements(&filter, paging).await
    }

    async fn load_settlement(&self, id: i64) -> Result<Settlement> {
        self.repo
            .get_settlement(id)
            .await?
            .ok_or(CrmError::SettlementNotFound(id))
    }
}
