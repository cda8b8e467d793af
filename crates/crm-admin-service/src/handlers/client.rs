//! 客户管理 HTTP 处理器
//!
//! 客户建档、资料维护、审核流转（提交/通过/退回/拒绝/结案）、
//! 业务员与分润规则指派，以及客户事件时间线。

use axum::extract::State;
use crm_core::models::{Client, EventLog};
use crm_core::service::ClosureCheck;
use tracing::instrument;
use validator::Validate;

use crate::dto::{
    ApiResponse, AssignAgentRequest, AssignRuleRequest, ClientListQuery, CreateClientRequest,
    PageResponse, PaginationParams, ReasonRequest, UpdateClientRequest,
};
use crate::error::Result;
use crate::extract::{Json, Path, Query};
use crate::middleware::CurrentActor;
use crate::state::AppState;

/// 客户列表（业务员只看到自己名下的客户）
///
/// GET /api/crm/clients
#[instrument(skip(state, actor))]
pub async fn list_clients(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<ClientListQuery>,
) -> Result<Json<ApiResponse<PageResponse<Client>>>> {
    let page = state
        .services
        .clients
        .list(&actor, query.into(), pagination.paging())
        .await?;
    Ok(Json(ApiResponse::success(PageResponse::from_page(page, &pagination))))
}

/// 新建客户
///
/// POST /api/crm/clients
pub async fn create_client(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<CreateClientRequest>,
) -> Result<Json<ApiResponse<Client>>> {
    req.validate()?;
    let client = state.services.clients.create(&actor, req.into()).await?;
    Ok(Json(ApiResponse::success(client)))
}

/// 客户详情
///
/// GET /api/crm/clients/{id}
pub async fn get_client(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Client>>> {
    let client = state.services.clients.get(&actor, id).await?;
    Ok(Json(ApiResponse::success(client)))
}

/// 更新客户联系信息
///
/// PUT /api/crm/clients/{id}
pub async fn update_client(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
    Json(req): Json<UpdateClientRequest>,
) -> Result<Json<ApiResponse<Client>>> {
    req.validate()?;
    let client = state.services.clients.update(&actor, id, req.into()).await?;
    Ok(Json(ApiResponse::success(client)))
}

/// 提交审核
///
/// POST /api/crm/clients/{id}/submit
pub async fn submit_client(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Client>>> {
    let client = state.services.clients.submit(&actor, id).await?;
    Ok(Json(ApiResponse::success(client)))
}

/// 审核通过
///
/// POST /api/crm/clients/{id}/approve
pub async fn approve_client(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Client>>> {
    let client = state.services.clients.approve(&actor, id).await?;
    Ok(Json(ApiResponse::success(client)))
}

/// 退回补充资料
///
/// POST /api/crm/clients/{id}/return
pub async fn return_client(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
    Json(req): Json<ReasonRequest>,
) -> Result<Json<ApiResponse<Client>>> {
    req.validate()?;
    let client = state
        .services
        .clients
        .return_to_intake(&actor, id, &req.reason)
        .await?;
    Ok(Json(ApiResponse::success(client)))
}

/// 拒绝客户
///
/// POST /api/crm/clients/{id}/reject
pub async fn reject_client(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
    Json(req): Json<ReasonRequest>,
) -> Result<Json<ApiResponse<Client>>> {
    req.validate()?;
    let client = state
        .services
        .clients
        .reject(&actor, id, &req.reason)
        .await?;
    Ok(Json(ApiResponse::success(client)))
}

/// 结案前检查各平台余额
///
/// GET /api/crm/clients/{id}/closure-check
pub async fn closure_check(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ClosureCheck>>> {
    let check = state.services.closure.check(&actor, id).await?;
    Ok(Json(ApiResponse::success(check)))
}

/// 结案
///
/// POST /api/crm/clients/{id}/close
///
/// 任一平台余额不为零时返回 OUTSTANDING_BALANCES，data 中列出对应平台
pub async fn close_client(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
    Json(req): Json<ReasonRequest>,
) -> Result<Json<ApiResponse<Client>>> {
    req.validate()?;
    let client = state
        .services
        .closure
        .close(&actor, id, &req.reason)
        .await?;
    Ok(Json(ApiResponse::success(client)))
}

/// 改派业务员
///
/// PUT /api/crm/clients/{id}/agent
pub async fn assign_agent(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
    Json(req): Json<AssignAgentRequest>,
) -> Result<Json<ApiResponse<Client>>> {
    let client = state
        .services
        .clients
        .assign_agent(&actor, id, req.agent_id)
        .await?;
    Ok(Json(ApiResponse::success(client)))
}

/// 指定或清除分润规则
///
/// PUT /api/crm/clients/{id}/profit-share-rule
pub async fn assign_profit_share_rule(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
    Json(req): Json<AssignRuleRequest>,
) -> Result<Json<ApiResponse<Client>>> {
    let client = state
        .services
        .clients
        .assign_profit_share_rule(&actor, id, req.rule_id)
        .await?;
    Ok(Json(ApiResponse::success(client)))
}

/// 客户事件时间线
///
/// GET /api/crm/clients/{id}/events
pub async fn list_client_events(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<EventLog>>>> {
    let page = state
        .services
        .clients
        .list_events(&actor, id, pagination.paging())
        .await?;
    Ok(Json(ApiResponse::success(PageResponse::from_page(page, &pagination))))
}
