//! 系统用户管理 HTTP 处理器
//!
//! 业务员与后台员工账户的增改查和密码重置，仅管理员可用。

use axum::extract::State;
use crm_core::models::User;
use crm_core::service::CreateUserInput;
use tracing::instrument;
use validator::Validate;

use crate::auth::{hash_password, validate_password_strength};
use crate::dto::{
    ApiResponse, CreateUserRequest, PageResponse, PaginationParams, ResetPasswordRequest,
    UpdateUserRequest, UserListQuery,
};
use crate::error::Result;
use crate::extract::{Json, Path, Query};
use crate::middleware::CurrentActor;
use crate::state::AppState;

/// 用户列表
///
/// GET /api/crm/users
#[instrument(skip(state, actor))]
pub async fn list_users(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<ApiResponse<PageResponse<User>>>> {
    let page = state
        .services
        .users
        .list(&actor, query.into(), pagination.paging())
        .await?;
    Ok(Json(ApiResponse::success(PageResponse::from_page(page, &pagination))))
}

/// 创建用户
///
/// POST /api/crm/users
pub async fn create_user(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<ApiResponse<User>>> {
    req.validate()?;
    validate_password_strength(&req.password)?;

    let password_hash = hash_password(&req.password)?;
    let user = state
        .services
        .users
        .create(
            &actor,
            CreateUserInput {
                username: req.username,
                password_hash,
                display_name: req.display_name,
                email: req.email,
                role: req.role,
                supervisor_id: req.supervisor_id,
                star_level: req.star_level,
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(user)))
}

/// 用户详情
///
/// GET /api/crm/users/{id}
pub async fn get_user(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<User>>> {
    let user = state.services.users.get(&actor, id).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// 更新用户资料、角色或状态
///
/// PUT /api/crm/users/{id}
pub async fn update_user(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<ApiResponse<User>>> {
    req.validate()?;
    let user = state.services.users.update(&actor, id, req.into()).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// 重置密码
///
/// POST /api/crm/users/{id}/reset-password
///
/// 同时清除失败次数与锁定状态
pub async fn reset_password(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<()>>> {
    req.validate()?;
    validate_password_strength(&req.new_password)?;

    let password_hash = hash_password(&req.new_password)?;
    state
        .services
        .users
        .set_password(&actor, id, &password_hash)
        .await?;

    Ok(Json(ApiResponse::success_with_message((), "密码已重置")))
}
