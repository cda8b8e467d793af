//! 客户关键字检索

use axum::extract::State;
use crm_core::models::Client;

use crate::dto::{ApiResponse, SearchQuery};
use crate::error::Result;
use crate::extract::{Json, Query};
use crate::middleware::CurrentActor;
use crate::state::AppState;

/// 按姓名、邮箱、电话模糊匹配，业务员只能搜到自己的客户
///
/// GET /api/crm/search?q=
pub async fn search_clients(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<Vec<Client>>>> {
    let clients = state
        .services
        .clients
        .search(&actor, &query.q, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(clients)))
}
