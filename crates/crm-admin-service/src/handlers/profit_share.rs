//! 分润规则与结算单 HTTP 处理器

use axum::extract::State;
use crm_core::models::{ProfitShareRule, Settlement};
use tracing::instrument;
use validator::Validate;

use crate::dto::{
    ApiResponse, CreateRuleRequest, CreateSettlementRequest, PageResponse, PaginationParams,
    RuleListQuery, RuleStatusRequest, SettlementListQuery,
};
use crate::error::Result;
use crate::extract::{Json, Path, Query};
use crate::middleware::CurrentActor;
use crate::state::AppState;

// ============================================
// 分润规则
// ============================================

/// GET /api/crm/profit-share-rules
pub async fn list_rules(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<RuleListQuery>,
) -> Result<Json<ApiResponse<Vec<ProfitShareRule>>>> {
    let rules = state
        .services
        .profit_share
        .list_rules(&actor, query.active)
        .await?;
    Ok(Json(ApiResponse::success(rules)))
}

/// 创建分润规则（管理员），各项百分比之和必须正好为 100
///
/// POST /api/crm/profit-share-rules
pub async fn create_rule(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<CreateRuleRequest>,
) -> Result<Json<ApiResponse<ProfitShareRule>>> {
    req.validate()?;
    let details = req.rule_details();
    let rule = state
        .services
        .profit_share
        .create_rule(&actor, &req.name, req.description, details)
        .await?;
    Ok(Json(ApiResponse::success(rule)))
}

/// GET /api/crm/profit-share-rules/{id}
pub async fn get_rule(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ProfitShareRule>>> {
    let rule = state.services.profit_share.get_rule(&actor, id).await?;
    Ok(Json(ApiResponse::success(rule)))
}

/// 启用或停用规则
///
/// PATCH /api/crm/profit-share-rules/{id}/status
pub async fn set_rule_status(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
    Json(req): Json<RuleStatusRequest>,
) -> Result<Json<ApiResponse<ProfitShareRule>>> {
    let rule = state
        .services
        .profit_share
        .set_rule_active(&actor, id, req.active)
        .await?;
    Ok(Json(ApiResponse::success(rule)))
}

// ============================================
// 结算单
// ============================================

/// GET /api/crm/settlements
#[instrument(skip(state, actor))]
pub async fn list_settlements(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<SettlementListQuery>,
) -> Result<Json<ApiResponse<PageResponse<Settlement>>>> {
    let page = state
        .services
        .profit_share
        .list_settlements(&actor, query.into(), pagination.paging())
        .await?;
    Ok(Json(ApiResponse::success(PageResponse::from_page(page, &pagination))))
}

/// 按规则拆分利润生成结算单，ruleId 缺省为客户已指定的规则
///
/// POST /api/crm/settlements
pub async fn create_settlement(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<CreateSettlementRequest>,
) -> Result<Json<ApiResponse<Settlement>>> {
    req.validate()?;
    let settlement = state
        .services
        .profit_share
        .create_settlement(&actor, req.into())
        .await?;
    Ok(Json(ApiResponse::success(settlement)))
}

/// GET /api/crm/settlements/{id}
pub async fn get_settlement(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Settlement>>> {
    let settlement = state.services.profit_share.get_settlement(&actor, id).await?;
    Ok(Json(ApiResponse::success(settlement)))
}

/// POST /api/crm/settlements/{id}/confirm
pub async fn confirm_settlement(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Settlement>>> {
    let settlement = state
        .services
        .profit_share
        .confirm_settlement(&actor, id)
        .await?;
    Ok(Json(ApiResponse::success(settlement)))
}
