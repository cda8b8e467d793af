//! 认证相关的 HTTP 处理器
//!
//! 登录、登出、获取当前用户和刷新 Token

use axum::extract::State;
use chrono::Utc;
use crm_core::models::{LoginGate, User};
use tracing::{info, warn};
use validator::Validate;

use crate::auth::verify_password;
use crate::dto::{ApiResponse, LoginRequest, LoginResponse, RefreshResponse};
use crate::error::{AdminError, Result};
use crate::extract::Json;
use crate::middleware::CurrentActor;
use crate::state::AppState;

/// 用户登录
///
/// POST /api/crm/auth/login
///
/// 连续失败达到阈值后锁定账户，锁定期内即使密码正确也拒绝登录。
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>> {
    req.validate()?;

    let users = &state.services.users;
    let user = users
        .find_by_username(&req.username)
        .await?
        .ok_or(AdminError::InvalidCredentials)?;

    let now = Utc::now();
    match user.login_gate(now) {
        LoginGate::Allowed => {}
        LoginGate::Disabled => return Err(AdminError::UserDisabled),
        LoginGate::Locked(until) => return Err(AdminError::UserLocked { until }),
    }

    if !verify_password(&req.password, &user.password_hash)? {
        let auth = &state.config.auth;
        let locked = users
            .record_login_failure(&user, now, auth.lockout_threshold, auth.lockout_minutes)
            .await?;
        if let Some(until) = locked {
            warn!(user_id = user.id, %until, "连续登录失败，账户已锁定");
            return Err(AdminError::UserLocked { until });
        }
        return Err(AdminError::InvalidCredentials);
    }

    users.record_login_success(user.id).await?;
    let (token, expires_at) = state.jwt_manager.generate_token(&user)?;
    info!(user_id = user.id, role = user.role.as_str(), "用户登录成功");

    Ok(Json(ApiResponse::success(LoginResponse {
        token,
        expires_at,
        user,
    })))
}

/// 登出
///
/// POST /api/crm/auth/logout
///
/// Token 无状态，由客户端丢弃即可
pub async fn logout(CurrentActor(actor): CurrentActor) -> Json<ApiResponse<()>> {
    info!(user_id = actor.user_id, "用户登出");
    Json(ApiResponse::success_empty())
}

/// 当前用户信息
///
/// GET /api/crm/auth/me
pub async fn me(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<ApiResponse<User>>> {
    let user = state.services.users.get(&actor, actor.user_id).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// 刷新 Token
///
/// POST /api/crm/auth/refresh
///
/// 重新读取用户，角色变更在新 Token 中生效，已禁用的用户不能续签
pub async fn refresh(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<ApiResponse<RefreshResponse>>> {
    let user = state.services.users.get(&actor, actor.user_id).await?;
    if !user.is_active() {
        return Err(AdminError::UserDisabled);
    }
    let (token, expires_at) = state.jwt_manager.generate_token(&user)?;
    Ok(Json(ApiResponse::success(RefreshResponse { token, expires_at })))
}
