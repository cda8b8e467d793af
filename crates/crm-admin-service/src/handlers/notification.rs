//! 站内通知 HTTP 处理器
//!
//! 只能读取和标记当前登录用户自己的通知。

use axum::extract::State;
use crm_core::models::Notification;

use crate::dto::{ApiResponse, CountResponse, NotificationListQuery, PageResponse, PaginationParams};
use crate::error::Result;
use crate::extract::{Json, Path, Query};
use crate::middleware::CurrentActor;
use crate::state::AppState;

/// GET /api/crm/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<NotificationListQuery>,
) -> Result<Json<ApiResponse<PageResponse<Notification>>>> {
    let page = state
        .services
        .notifications
        .list(&actor, query.unread_only, pagination.paging())
        .await?;
    Ok(Json(ApiResponse::success(PageResponse::from_page(page, &pagination))))
}

/// GET /api/crm/notifications/unread-count
pub async fn unread_count(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<ApiResponse<CountResponse>>> {
    let count = state.services.notifications.unread_count(&actor).await?;
    Ok(Json(ApiResponse::success(CountResponse { count })))
}

/// POST /api/crm/notifications/{id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>> {
    state.services.notifications.mark_read(&actor, id).await?;
    Ok(Json(ApiResponse::success_empty()))
}

/// 全部标为已读，返回本次更新的条数
///
/// POST /api/crm/notifications/read-all
pub async fn mark_all_read(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<ApiResponse<CountResponse>>> {
    let updated = state.services.notifications.mark_all_read(&actor).await?;
    Ok(Json(ApiResponse::success(CountResponse {
        count: updated as i64,
    })))
}
