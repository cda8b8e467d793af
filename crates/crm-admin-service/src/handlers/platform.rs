//! 客户平台账户与验证流程 HTTP 处理器
//!
//! 登记平台、发起验证、记录验证结果、管理员解锁和余额维护。

use axum::extract::State;
use crm_core::models::{ClientPlatform, VerificationOutcome};
use validator::Validate;

use crate::dto::{AddPlatformRequest, ApiResponse, UpdateBalanceRequest};
use crate::error::Result;
use crate::extract::{Json, Path};
use crate::middleware::CurrentActor;
use crate::state::AppState;

/// 客户的平台列表
///
/// GET /api/crm/clients/{id}/platforms
pub async fn list_platforms(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(client_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<ClientPlatform>>>> {
    let platforms = state
        .services
        .verification
        .list_platforms(&actor, client_id)
        .await?;
    Ok(Json(ApiResponse::success(platforms)))
}

/// 登记平台账户
///
/// POST /api/crm/clients/{id}/platforms
pub async fn add_platform(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(client_id): Path<i64>,
    Json(req): Json<AddPlatformRequest>,
) -> Result<Json<ApiResponse<ClientPlatform>>> {
    req.validate()?;
    let platform = state
        .services
        .verification
        .add_platform(&actor, client_id, req.kind, req.account_ref)
        .await?;
    Ok(Json(ApiResponse::success(platform)))
}

/// 发起验证
///
/// POST /api/crm/platforms/{id}/request-verification
pub async fn request_verification(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ClientPlatform>>> {
    let platform = state
        .services
        .verification
        .request_verification(&actor, id)
        .await?;
    Ok(Json(ApiResponse::success(platform)))
}

/// 记录一次验证结果
///
/// POST /api/crm/platforms/{id}/verification-attempts
///
/// 请求体：`{"outcome":"SUCCESS"}` 或 `{"outcome":"FAILURE","note":"..."}`。
/// 冷却期内返回 VERIFICATION_COOLDOWN，data.retryAt 为下次可尝试时间。
pub async fn record_attempt(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
    Json(outcome): Json<VerificationOutcome>,
) -> Result<Json<ApiResponse<ClientPlatform>>> {
    let platform = state
        .services
        .verification
        .record_attempt(&actor, id, outcome)
        .await?;
    Ok(Json(ApiResponse::success(platform)))
}

/// 解除验证锁定（管理员）
///
/// POST /api/crm/platforms/{id}/unlock
pub async fn unlock_platform(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ClientPlatform>>> {
    let platform = state.services.verification.unlock(&actor, id).await?;
    Ok(Json(ApiResponse::success(platform)))
}

/// 更新平台余额
///
/// PUT /api/crm/platforms/{id}/balance
pub async fn update_balance(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
    Json(req): Json<UpdateBalanceRequest>,
) -> Result<Json<ApiResponse<ClientPlatform>>> {
    let platform = state
        .services
        .verification
        .update_balance(&actor, id, req.balance)
        .await?;
    Ok(Json(ApiResponse::success(platform)))
}
