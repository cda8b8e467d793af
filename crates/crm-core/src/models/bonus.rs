//! 奖金池与分配明细

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

use super::enums::{AllocationKind, PoolStatus};

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusPool {
    pub id: i64,
    pub client_id: i64,
    /// 成交业务员
    pub closer_id: i64,
    pub total_amount: Decimal,
    /// 直接奖金部分，剩余部分进入星级池
    pub direct_amount: Decimal,
    pub status: PoolStatus,
    pub note: Option<String>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub allocated_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl BonusPool {
    pub fn star_pool(&self) -> Decimal {
        self.total_amount - self.direct_amount
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusAllocation {
    pub id: i64,
    pub pool_id: i64,
    /// House 分配没有收款人
    pub agent_id: Option<i64>,
    pub kind: AllocationKind,
    pub star_level: i32,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBonusPool {
    pub client_id: i64,
    pub closer_id: i64,
    pub total_amount: Decimal,
    pub direct_amount: Decimal,
    pub note: Option<String>,
    pub created_by: i64,
}

/// 待写入的分配行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAllocation {
    pub agent_id: Option<i64>,
    pub kind: AllocationKind,
    pub star_level: i32,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct PoolFilter {
    pub client_id: Option<i64>,
    pub status: Option<PoolStatus>,
}
