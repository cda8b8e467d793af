//! 待办事项 HTTP 处理器

use axum::extract::State;
use crm_core::models::Todo;
use tracing::instrument;
use validator::Validate;

use crate::dto::{ApiResponse, CreateTodoRequest, PageResponse, PaginationParams, TodoListQuery};
use crate::error::Result;
use crate::extract::{Json, Path, Query};
use crate::middleware::CurrentActor;
use crate::state::AppState;

/// 待办列表，业务员只能查看自己的待办
///
/// GET /api/crm/todos
#[instrument(skip(state, actor))]
pub async fn list_todos(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<TodoListQuery>,
) -> Result<Json<ApiResponse<PageResponse<Todo>>>> {
    let page = state
        .services
        .todos
        .list(&actor, query.into(), pagination.paging())
        .await?;
    Ok(Json(ApiResponse::success(PageResponse::from_page(page, &pagination))))
}

/// POST /api/crm/todos
pub async fn create_todo(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<CreateTodoRequest>,
) -> Result<Json<ApiResponse<Todo>>> {
    req.validate()?;
    let todo = state.services.todos.create(&actor, req.into()).await?;
    Ok(Json(ApiResponse::success(todo)))
}

/// GET /api/crm/todos/{id}
pub async fn get_todo(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Todo>>> {
    let todo = state.services.todos.get(&actor, id).await?;
    Ok(Json(ApiResponse::success(todo)))
}

/// POST /api/crm/todos/{id}/complete
pub async fn complete_todo(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Todo>>> {
    let todo = state.services.todos.complete(&actor, id).await?;
    Ok(Json(ApiResponse::success(todo)))
}

/// POST /api/crm/todos/{id}/cancel
pub async fn cancel_todo(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Todo>>> {
    let todo = state.services.todos.cancel(&actor, id).await?;
    Ok(Json(ApiResponse::success(todo)))
}

/// POST /api/crm/todos/{id}/reopen
pub async fn reopen_todo(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Todo>>> {
    let todo = state.services.todos.reopen(&actor, id).await?;
    Ok(Json(ApiResponse::success(todo)))
}
