//! CRM 业务核心
//!
//! 客户入驻、平台验证、延期审批、结案、佣金与分润计算等业务规则，
//! 以及对应的 PostgreSQL 仓储实现。HTTP 层见 crm-admin-service。

pub mod error;
pub mod models;
pub mod repository;
pub mod service;

pub use error::{CrmError, Result};

/// 编译期嵌入的数据库迁移
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");
