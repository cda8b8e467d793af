//! 角色守卫中间件
//!
//! 在路由分组上限制可访问的角色，管理员通过所有守卫。
//! 业务服务内部仍会按操作者身份再做一次校验。

use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use crm_core::models::UserRole;
use std::future::Future;
use std::pin::Pin;

use crate::auth::Claims;
use crate::error::AdminError;

pub const STAFF_ONLY: &[UserRole] = &[UserRole::Backoffice, UserRole::Admin];
pub const ADMIN_ONLY: &[UserRole] = &[UserRole::Admin];

/// 角色守卫工厂
///
/// ```ignore
/// .route_layer(axum::middleware::from_fn(require_roles(STAFF_ONLY)))
/// ```
pub fn require_roles(
    roles: &'static [UserRole],
) -> impl Fn(Request<Body>, Next) -> Pin<Box<dyn Future<Output = Response> + Send>>
+ Clone
+ Send
+ 'static {
    move |request: Request<Body>, next: Next| {
        Box::pin(async move { check_roles(request, next, roles).await })
    }
}

async fn check_roles(request: Request<Body>, next: Next, roles: &[UserRole]) -> Response {
    let role = match request.extensions().get::<Claims>() {
        Some(claims) => claims.role,
        None => return AdminError::Unauthorized("未认证".to_string()).into_response(),
    };

    if role_allowed(role, roles) {
        next.run(request).await
    } else {
        AdminError::Forbidden(format!("角色 {} 无权访问", role.as_str())).into_response()
    }
}

fn role_allowed(role: UserRole, roles: &[UserRole]) -> bool {
    role == UserRole::Admin || roles.contains(&role)
}
