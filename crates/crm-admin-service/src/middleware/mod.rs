//! 中间件模块
//!
//! 认证、角色守卫与操作审计

mod audit;
mod auth;
mod permission;

pub use audit::audit_middleware;
pub use auth::{CurrentActor, auth_middleware};
pub use permission::{ADMIN_ONLY, STAFF_ONLY, require_roles};
