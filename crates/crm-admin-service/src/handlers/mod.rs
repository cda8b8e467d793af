//! HTTP 请求处理器
//!
//! 处理器只负责参数解析与响应包装，权限与业务规则由 crm-core 的服务完成。

pub mod audit_log;
pub mod auth;
pub mod bonus;
pub mod client;
pub mod document;
pub mod export;
pub mod extension;
pub mod notification;
pub mod platform;
pub mod profit_share;
pub mod search;
pub mod todo;
pub mod user;
