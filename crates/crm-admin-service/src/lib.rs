//! CRM 管理后台服务
//!
//! 面向业务员与后台员工的 REST API。
//!
//! ## 核心功能
//!
//! - **客户入驻**：建档、提交审核、通过/退回/拒绝，入驻期限与延期审批
//! - **平台验证**：BetMGM 等平台账户的验证尝试、冷却与锁定
//! - **结案**：所有平台余额清零后结案
//! - **佣金与分润**：星级奖金池分配、按规则拆分利润生成结算单
//! - **待办与通知**：按角色分组推送站内通知
//! - **文件与导出**：客户文件上传下载，CSV/PDF 报表
//! - **操作日志**：记录所有写操作，支持审计追溯
//!
//! ## 模块结构
//!
//! - `app`: Router 与中间件栈组装
//! - `auth`: JWT 与密码
//! - `dto`: 请求和响应的数据传输对象
//! - `error`: 错误类型定义
//! - `export`: CSV/PDF 生成
//! - `extract`: 统一错误响应的请求提取器
//! - `handlers`: HTTP 请求处理器
//! - `middleware`: 认证、角色守卫、审计
//! - `routes`: 路由配置
//! - `state`: 应用状态
//! - `storage`: 本地文件存储
//!
//! 业务规则全部在 `crm-core` 中实现，本 crate 只负责 HTTP 适配。

pub mod app;
pub mod auth;
pub mod dto;
pub mod error;
pub mod export;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod storage;

pub use app::build_app;
pub use dto::{ApiResponse, PageResponse, PaginationParams};
pub use error::{AdminError, Result};
pub use state::AppState;
