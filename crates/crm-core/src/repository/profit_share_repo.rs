//! 分润规则与结算单仓储

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;

use super::insert_event;
use super::traits::ProfitShareRepositoryTrait;
use crate::error::Result;
use crate::models::{
    NewEvent, NewProfitShareRule, NewSettlement, NewSettlementLine, Page, Paging,
    ProfitShareDetail, ProfitShareRule, Settlement, SettlementFilter, SettlementLine,
    SettlementStatus,
};

const RULE_COLUMNS: &str = "id, name, description, active, created_by, created_at, updated_at";
const DETAIL_COLUMNS: &str = "id, rule_id, recipient_id, label, percentage";
const SETTLEMENT_COLUMNS: &str = "id, client_id, rule_id, period_label, profit_amount, status, \
     created_by, confirmed_by, created_at, confirmed_at";
const LINE_COLUMNS: &str = "id, settlement_id, recipient_id, label, percentage, amount";

pub struct ProfitShareRepository {
    pool: PgPool,
}

impl ProfitShareRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 批量加载规则明细并挂到规则上
    async fn attach_details(&self, rules: &mut [ProfitShareRule]) -> Result<()> {
        if rules.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = rules.iter().map(|r| r.id).collect();
        let sql = format!(
            "SELECT {DETAIL_COLUMNS} FROM profit_share_details WHERE rule_id = ANY($1) ORDER BY id"
        );
        let details = sqlx::query_as::<_, ProfitShareDetail>(&sql)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;

        let mut grouped: HashMap<i64, Vec<ProfitShareDetail>> = HashMap::new();
        for detail in details {
            grouped.entry(detail.rule_id).or_default().push(detail);
        }
        for rule in rules.iter_mut() {
            rule.details = grouped.remove(&rule.id).unwrap_or_default();
        }
        Ok(())
    }

    /// 批量加载结算行并挂到结算单上
    async fn attach_lines(&self, settlements: &mut [Settlement]) -> Result<()> {
        if settlements.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = settlements.iter().map(|s| s.id).collect();
        let sql = format!(
            "SELECT {LINE_COLUMNS} FROM settlement_lines WHERE settlement_id = ANY($1) ORDER BY id"
        );
        let lines = sqlx::query_as::<_, SettlementLine>(&sql)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;

        let mut grouped: HashMap<i64, Vec<SettlementLine>> = HashMap::new();
        for line in lines {
            grouped.entry(line.settlement_id).or_default().push(line);
        }
        for settlement in settlements.iter_mut() {
            settlement.lines = grouped.remove(&settlement.id).unwrap_or_default();
        }
        Ok(())
    }
}

#[async_trait]
impl ProfitShareRepositoryTrait for ProfitShareRepository {
    async fn get_rule(&self, id: i64) -> Result<Option<ProfitShareRule>> {
        let sql = format!("SELECT {RULE_COLUMNS} FROM profit_share_rules WHERE id = $1");
        let rule = sqlx::query_as::<_, ProfitShareRule>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match rule {
            Some(rule) => {
                let mut rules = [rule];
                self.attach_details(&mut rules).await?;
                let [rule] = rules;
                Ok(Some(rule))
            }
            None => Ok(None),
        }
    }

    async fn list_rules(&self, active: Option<bool>) -> Result<Vec<ProfitShareRule>> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM profit_share_rules WHERE ($1::boolean IS NULL OR active = $1) ORDER BY id"
        );
        let mut rules = sqlx::query_as::<_, ProfitShareRule>(&sql)
            .bind(active)
            .fetch_all(&self.pool)
            .await?;
        self.attach_details(&mut rules).await?;
        Ok(rules)
    }

    async fn create_rule(&self, rule: &NewProfitShareRule) -> Result<ProfitShareRule> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO profit_share_rules (name, description, created_by)
            VALUES ($1, $2, $3)
            RETURNING {RULE_COLUMNS}
            "#
        );
        let mut created = sqlx::query_as::<_, ProfitShareRule>(&sql)
            .bind(&rule.name)
            .bind(&rule.description)
            .bind(rule.created_by)
            .fetch_one(&mut *tx)
            .await?;

        let detail_sql = format!(
            r#"
            INSERT INTO profit_share_details (rule_id, recipient_id, label, percentage)
            VALUES ($1, $2, $3, $4)
            RETURNING {DETAIL_COLUMNS}
            "#
        );
        for detail in &rule.details {
            let inserted = sqlx::query_as::<_, ProfitShareDetail>(&detail_sql)
                .bind(created.id)
                .bind(detail.recipient_id)
                .bind(&detail.label)
                .bind(detail.percentage)
                .fetch_one(&mut *tx)
                .await?;
            created.details.push(inserted);
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn set_rule_active(&self, id: i64, active: bool) -> Result<Option<ProfitShareRule>> {
        let sql = format!(
            r#"
            UPDATE profit_share_rules SET active = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {RULE_COLUMNS}
            "#
        );
        let rule = sqlx::query_as::<_, ProfitShareRule>(&sql)
            .bind(id)
            .bind(active)
            .fetch_optional(&self.pool)
            .await?;

        match rule {
            Some(rule) => {
                let mut rules = [rule];
                self.attach_details(&mut rules).await?;
                let [rule] = rules;
                Ok(Some(rule))
            }
            None => Ok(None),
        }
    }

    async fn get_settlement(&self, id: i64) -> Result<Option<Settlement>> {
        let sql = format!("SELECT {SETTLEMENT_COLUMNS} FROM settlements WHERE id = $1");
        let settlement = sqlx::query_as::<_, Settlement>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match settlement {
            Some(settlement) => {
                let mut settlements = [settlement];
                self.attach_lines(&mut settlements).await?;
                let [settlement] = settlements;
                Ok(Some(settlement))
            }
            None => Ok(None),
        }
    }

    async fn list_settlements(
        &self,
        filter: &SettlementFilter,
        paging: Paging,
    ) -> Result<Page<Settlement>> {
        let condition = r#"
            ($1::bigint IS NULL OR client_id = $1)
            AND ($2::varchar IS NULL OR status = $2)
        "#;

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM settlements WHERE {condition}"))
                .bind(filter.client_id)
                .bind(filter.status)
                .fetch_one(&self.pool)
                .await?;

        let sql = format!(
            r#"
            SELECT {SETTLEMENT_COLUMNS} FROM settlements
            WHERE {condition}
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#
        );
        let mut items = sqlx::query_as::<_, Settlement>(&sql)
            .bind(filter.client_id)
            .bind(filter.status)
            .bind(paging.limit)
            .bind(paging.offset)
            .fetch_all(&self.pool)
            .await?;
        self.attach_lines(&mut items).await?;

        Ok(Page::new(items, total))
    }

    async fn create_settlement(
        &self,
        settlement: &NewSettlement,
        lines: &[NewSettlementLine],
        event: &NewEvent,
    ) -> Result<Settlement> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO settlements (client_id, rule_id, period_label, profit_amount, created_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {SETTLEMENT_COLUMNS}
            "#
        );
        let mut created = sqlx::query_as::<_, Settlement>(&sql)
            .bind(settlement.client_id)
            .bind(settlement.rule_id)
            .bind(&settlement.period_label)
            .bind(settlement.profit_amount)
            .bind(settlement.created_by)
            .fetch_one(&mut *tx)
            .await?;

        let line_sql = format!(
            r#"
            INSERT INTO settlement_lines (settlement_id, recipient_id, label, percentage, amount)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {LINE_COLUMNS}
            "#
        );
        for line in lines {
            let inserted = sqlx::query_as::<_, SettlementLine>(&line_sql)
                .bind(created.id)
                .bind(line.recipient_id)
                .bind(&line.label)
                .bind(line.percentage)
                .bind(line.amount)
                .fetch_one(&mut *tx)
                .await?;
            created.lines.push(inserted);
        }

        insert_event(&mut tx, event).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn confirm_settlement(
        &self,
        id: i64,
        confirmed_by: i64,
        event: &NewEvent,
    ) -> Result<Option<Settlement>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE settlements SET status = $2, confirmed_by = $3, confirmed_at = NOW()
            WHERE id = $1 AND status = $4
            RETURNING {SETTLEMENT_COLUMNS}
            "#
        );
        let confirmed = sqlx::query_as::<_, Settlement>(&sql)
            .bind(id)
            .bind(SettlementStatus::Confirmed)
            .bind(confirmed_by)
            .bind(SettlementStatus::Pending)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(confirmed) = confirmed else {
            return Ok(None);
        };

        insert_event(&mut tx, event).await?;
        tx.commit().await?;

        let mut settlements = [confirmed];
        self.attach_lines(&mut settlements).await?;
        let [confirmed] = settlements;
        Ok(Some(confirmed))
    }
}
