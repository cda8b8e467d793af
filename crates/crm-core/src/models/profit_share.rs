//! 分润规则与结算单

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

use super::enums::SettlementStatus;

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitShareRule {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub details: Vec<ProfitShareDetail>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitShareDetail {
    pub id: i64,
    pub rule_id: i64,
    /// 为空表示公司留存等非个人收款方
    pub recipient_id: Option<i64>,
    pub label: String,
    /// 百分比，0 < p <= 100，两位小数
    pub percentage: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewProfitShareRule {
    pub name: String,
    pub description: Option<String>,
    pub created_by: i64,
    pub details: Vec<NewRuleDetail>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRuleDetail {
    pub recipient_id: Option<i64>,
    pub label: String,
    pub percentage: Decimal,
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub id: i64,
    pub client_id: i64,
    pub rule_id: i64,
    /// 结算周期描述，如 "2026-09"
    pub period_label: String,
    pub profit_amount: Decimal,
    pub status: SettlementStatus,
    pub created_by: i64,
    pub confirmed_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    #[sqlx(skip)]
    pub lines: Vec<SettlementLine>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementLine {
    pub id: i64,
    pub settlement_id: i64,
    pub recipient_id: Option<i64>,
    pub label: String,
    pub percentage: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewSettlement {
    pub client_id: i64,
    pub rule_id: i64,
    pub period_label: String,
    pub profit_amount: Decimal,
    pub created_by: i64,
}

/// 按规则拆分出的结算行
#[derive(Debug, Clone, PartialEq)]
pub struct NewSettlementLine {
    pub recipient_id: Option<i64>,
    pub label: String,
    pub percentage: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct SettlementFilter {
    pub client_id: Option<i64>,
    pub status: Option<SettlementStatus>,
}
