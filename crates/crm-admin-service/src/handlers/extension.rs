//! 入驻期限延期申请 HTTP 处理器

use axum::extract::State;
use crm_core::models::ExtensionRequest;
use tracing::instrument;
use validator::Validate;

use crate::dto::{
    ApiResponse, CreateExtensionRequest, ExtensionListQuery, PageResponse, PaginationParams,
    ReasonRequest, ReviewRequest,
};
use crate::error::Result;
use crate::extract::{Json, Path, Query};
use crate::middleware::CurrentActor;
use crate::state::AppState;

/// 延期申请列表
///
/// GET /api/crm/extensions
#[instrument(skip(state, actor))]
pub async fn list_extensions(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<ExtensionListQuery>,
) -> Result<Json<ApiResponse<PageResponse<ExtensionRequest>>>> {
    let page = state
        .services
        .extensions
        .list(&actor, query.into(), pagination.paging())
        .await?;
    Ok(Json(ApiResponse::success(PageResponse::from_page(page, &pagination))))
}

/// 提交延期申请
///
/// POST /api/crm/extensions
pub async fn create_extension(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<CreateExtensionRequest>,
) -> Result<Json<ApiResponse<ExtensionRequest>>> {
    req.validate()?;
    let request = state
        .services
        .extensions
        .request(&actor, req.client_id, req.days, &req.reason)
        .await?;
    Ok(Json(ApiResponse::success(request)))
}

/// 延期申请详情
///
/// GET /api/crm/extensions/{id}
pub async fn get_extension(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ExtensionRequest>>> {
    let request = state.services.extensions.get(&actor, id).await?;
    Ok(Json(ApiResponse::success(request)))
}

/// 批准延期，请求体可省略
///
/// POST /api/crm/extensions/{id}/approve
pub async fn approve_extension(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
    body: Option<Json<ReviewRequest>>,
) -> Result<Json<ApiResponse<ExtensionRequest>>> {
    let review = body.map(|Json(r)| r).unwrap_or_default();
    review.validate()?;
    let request = state
        .services
        .extensions
        .approve(&actor, id, review.note)
        .await?;
    Ok(Json(ApiResponse::success(request)))
}

/// 驳回延期，必须填写原因
///
/// POST /api/crm/extensions/{id}/reject
pub async fn reject_extension(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
    Json(req): Json<ReasonRequest>,
) -> Result<Json<ApiResponse<ExtensionRequest>>> {
    req.validate()?;
    let request = state
        .services
        .extensions
        .reject(&actor, id, &req.reason)
        .await?;
    Ok(Json(ApiResponse::success(request)))
}
