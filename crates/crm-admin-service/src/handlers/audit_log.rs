//! 操作日志查询
//!
//! 审计中间件异步写入 operation_logs，这里按操作人、模块、动作、目标和时间范围过滤分页查询。

use axum::extract::State;
use tracing::instrument;

use crate::dto::{ApiResponse, OperationLogDto, OperationLogFilter, PageResponse, PaginationParams};
use crate::error::Result;
use crate::extract::{Json, Query};
use crate::state::AppState;

const FILTER_CLAUSE: &str = r#"
    WHERE ($1::bigint IS NULL OR operator_id = $1)
      AND ($2::text IS NULL OR module = $2)
      AND ($3::text IS NULL OR action = $3)
      AND ($4::text IS NULL OR target_type = $4)
      AND ($5::text IS NULL OR target_id = $5)
      AND ($6::timestamptz IS NULL OR created_at >= $6)
      AND ($7::timestamptz IS NULL OR created_at <= $7)
"#;

/// GET /api/crm/audit-logs（仅管理员）
#[instrument(skip(state))]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<OperationLogFilter>,
) -> Result<Json<ApiResponse<PageResponse<OperationLogDto>>>> {
    let paging = pagination.paging();

    let count_sql = format!("SELECT COUNT(*) FROM operation_logs {FILTER_CLAUSE}");
    let (total,): (i64,) = sqlx::query_as(&count_sql)
        .bind(filter.operator_id)
        .bind(&filter.module)
        .bind(&filter.action)
        .bind(&filter.target_type)
        .bind(&filter.target_id)
        .bind(filter.start_time)
        .bind(filter.end_time)
        .fetch_one(&state.pool)
        .await?;

    if total == 0 {
        return Ok(Json(ApiResponse::success(PageResponse::new(
            Vec::new(),
            0,
            pagination.page(),
            pagination.page_size(),
        ))));
    }

    let list_sql = format!(
        r#"
        SELECT id, operator_id, operator_name, module, action, target_type, target_id,
               ip_address, user_agent, created_at
        FROM operation_logs
        {FILTER_CLAUSE}
        ORDER BY created_at DESC, id DESC
        LIMIT $8 OFFSET $9
        "#
    );
    let items = sqlx::query_as::<_, OperationLogDto>(&list_sql)
        .bind(filter.operator_id)
        .bind(&filter.module)
        .bind(&filter.action)
        .bind(&filter.target_type)
        .bind(&filter.target_id)
        .bind(filter.start_time)
        .bind(filter.end_time)
        .bind(paging.limit)
        .bind(paging.offset)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(ApiResponse::success(PageResponse::new(
        items,
        total,
        pagination.page(),
        pagination.page_size(),
    ))))
}
