//! 佣金奖金池 HTTP 处理器
//!
//! 奖金池创建后按星级链路分配，核对无误再结算，结算后通知各业务员。

use axum::extract::State;
use crm_core::models::BonusPool;
use crm_core::service::PoolDetail;
use tracing::instrument;
use validator::Validate;

use crate::dto::{ApiResponse, CreatePoolRequest, PageResponse, PaginationParams, PoolListQuery};
use crate::error::Result;
use crate::extract::{Json, Path, Query};
use crate::middleware::CurrentActor;
use crate::state::AppState;

/// GET /api/crm/bonus-pools
#[instrument(skip(state, actor))]
pub async fn list_pools(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<PoolListQuery>,
) -> Result<Json<ApiResponse<PageResponse<BonusPool>>>> {
    let page = state
        .services
        .commission
        .list_pools(&actor, query.into(), pagination.paging())
        .await?;
    Ok(Json(ApiResponse::success(PageResponse::from_page(page, &pagination))))
}

/// 创建奖金池，closerId 缺省为客户的业务员
///
/// POST /api/crm/bonus-pools
pub async fn create_pool(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<CreatePoolRequest>,
) -> Result<Json<ApiResponse<BonusPool>>> {
    req.validate()?;
    let pool = state
        .services
        .commission
        .create_pool(&actor, req.into())
        .await?;
    Ok(Json(ApiResponse::success(pool)))
}

/// 奖金池详情（含分配明细）
///
/// GET /api/crm/bonus-pools/{id}
pub async fn get_pool(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<PoolDetail>>> {
    let detail = state.services.commission.get_pool(&actor, id).await?;
    Ok(Json(ApiResponse::success(detail)))
}

/// POST /api/crm/bonus-pools/{id}/allocate
pub async fn allocate_pool(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<PoolDetail>>> {
    let detail = state.services.commission.allocate(&actor, id).await?;
    Ok(Json(ApiResponse::success(detail)))
}

/// POST /api/crm/bonus-pools/{id}/settle
pub async fn settle_pool(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<PoolDetail>>> {
    let detail = state.services.commission.settle(&actor, id).await?;
    Ok(Json(ApiResponse::success(detail)))
}
