//! JWT 认证中间件
//!
//! 验证请求中的 Bearer Token 并将 Claims 注入请求扩展

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use crm_core::models::Actor;

use crate::auth::Claims;
use crate::error::AdminError;
use crate::state::AppState;

/// 无需认证的路由
const PUBLIC_PATHS: [&str; 3] = ["/api/crm/auth/login", "/health", "/ready"];

/// 认证中间件
///
/// 从 Authorization header 中提取 Bearer Token，验证后将 Claims 注入请求扩展。
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if PUBLIC_PATHS.contains(&path) {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let Some(token) = token else {
        return AdminError::Unauthorized("缺少认证 Token".to_string()).into_response();
    };

    match state.jwt_manager.verify_token(token) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// 当前操作者，从认证中间件注入的 Claims 还原
#[derive(Debug, Clone)]
pub struct CurrentActor(pub Actor);

impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = AdminError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<Claims>()
            .ok_or_else(|| AdminError::Unauthorized("未认证".to_string()))?;
        Ok(Self(claims.actor()?))
    }
}
