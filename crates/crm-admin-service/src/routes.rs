//! 路由配置模块
//!
//! 按角色分组定义 `/api/crm` 下的 REST 端点。分组守卫只做粗粒度拦截，
//! 细粒度的权限（业务员只能操作自己的客户等）由业务服务判断。

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, patch, post, put},
};

use crate::handlers;
use crate::middleware::{ADMIN_ONLY, STAFF_ONLY, require_roles};
use crate::state::AppState;

/// multipart 边界与表单字段的额外开销
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// 认证路由，登录为公开接口
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/refresh", post(handlers::auth::refresh))
}

/// 所有登录用户可访问的客户、平台、延期、待办、通知与文件路由
fn workspace_routes(upload_limit: usize) -> Router<AppState> {
    Router::new()
        // 客户
        .route(
            "/clients",
            get(handlers::client::list_clients).post(handlers::client::create_client),
        )
        .route(
            "/clients/{id}",
            get(handlers::client::get_client).put(handlers::client::update_client),
        )
        .route("/clients/{id}/submit", post(handlers::client::submit_client))
        .route(
            "/clients/{id}/closure-check",
            get(handlers::client::closure_check),
        )
        .route(
            "/clients/{id}/events",
            get(handlers::client::list_client_events),
        )
        // 平台
        .route(
            "/clients/{id}/platforms",
            get(handlers::platform::list_platforms).post(handlers::platform::add_platform),
        )
        .route(
            "/platforms/{id}/request-verification",
            post(handlers::platform::request_verification),
        )
        // 延期申请
        .route(
            "/extensions",
            get(handlers::extension::list_extensions).post(handlers::extension::create_extension),
        )
        .route("/extensions/{id}", get(handlers::extension::get_extension))
        // 待办
        .route(
            "/todos",
            get(handlers::todo::list_todos).post(handlers::todo::create_todo),
        )
        .route("/todos/{id}", get(handlers::todo::get_todo))
        .route("/todos/{id}/complete", post(handlers::todo::complete_todo))
        .route("/todos/{id}/cancel", post(handlers::todo::cancel_todo))
        .route("/todos/{id}/reopen", post(handlers::todo::reopen_todo))
        // 通知
        .route(
            "/notifications",
            get(handlers::notification::list_notifications),
        )
        .route(
            "/notifications/unread-count",
            get(handlers::notification::unread_count),
        )
        .route(
            "/notifications/{id}/read",
            post(handlers::notification::mark_read),
        )
        .route(
            "/notifications/read-all",
            post(handlers::notification::mark_all_read),
        )
        // 文件
        .route(
            "/clients/{id}/documents",
            post(handlers::document::upload_document)
                .layer(DefaultBodyLimit::max(upload_limit + MULTIPART_OVERHEAD_BYTES))
                .get(handlers::document::list_documents),
        )
        .route(
            "/documents/{id}/download",
            get(handlers::document::download_document),
        )
        // 检索与导出
        .route("/search", get(handlers::search::search_clients))
        .route(
            "/exports/clients.csv",
            get(handlers::export::export_clients_csv),
        )
        .route(
            "/exports/clients/{id}/summary.pdf",
            get(handlers::export::export_client_summary_pdf),
        )
}

/// 后台员工路由：审核、结案、余额、延期审批、奖金池与分润结算
fn staff_routes() -> Router<AppState> {
    Router::new()
        .route("/clients/{id}/approve", post(handlers::client::approve_client))
        .route("/clients/{id}/return", post(handlers::client::return_client))
        .route("/clients/{id}/reject", post(handlers::client::reject_client))
        .route("/clients/{id}/close", post(handlers::client::close_client))
        .route("/clients/{id}/agent", put(handlers::client::assign_agent))
        .route(
            "/clients/{id}/profit-share-rule",
            put(handlers::client::assign_profit_share_rule),
        )
        .route(
            "/platforms/{id}/verification-attempts",
            post(handlers::platform::record_attempt),
        )
        .route(
            "/platforms/{id}/balance",
            put(handlers::platform::update_balance),
        )
        .route(
            "/extensions/{id}/approve",
            post(handlers::extension::approve_extension),
        )
        .route(
            "/extensions/{id}/reject",
            post(handlers::extension::reject_extension),
        )
        // 奖金池
        .route(
            "/bonus-pools",
            get(handlers::bonus::list_pools).post(handlers::bonus::create_pool),
        )
        .route("/bonus-pools/{id}", get(handlers::bonus::get_pool))
        .route(
            "/bonus-pools/{id}/allocate",
            post(handlers::bonus::allocate_pool),
        )
        .route("/bonus-pools/{id}/settle", post(handlers::bonus::settle_pool))
        // 分润规则：查询对员工开放，创建与启停由服务限定为管理员
        .route(
            "/profit-share-rules",
            get(handlers::profit_share::list_rules).post(handlers::profit_share::create_rule),
        )
        .route(
            "/profit-share-rules/{id}",
            get(handlers::profit_share::get_rule),
        )
        .route(
            "/profit-share-rules/{id}/status",
            patch(handlers::profit_share::set_rule_status),
        )
        // 结算单
        .route(
            "/settlements",
            get(handlers::profit_share::list_settlements)
                .post(handlers::profit_share::create_settlement),
        )
        .route(
            "/settlements/{id}",
            get(handlers::profit_share::get_settlement),
        )
        .route(
            "/settlements/{id}/confirm",
            post(handlers::profit_share::confirm_settlement),
        )
        // 导出
        .route(
            "/exports/bonus-pools/{id}/allocations.csv",
            get(handlers::export::export_allocations_csv),
        )
        .route(
            "/exports/settlements/{id}/statement.pdf",
            get(handlers::export::export_settlement_pdf),
        )
        .route_layer(from_fn(require_roles(STAFF_ONLY)))
}

/// 管理员路由：用户管理、平台解锁、操作日志
fn admin_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users",
            get(handlers::user::list_users).post(handlers::user::create_user),
        )
        .route(
            "/users/{id}",
            get(handlers::user::get_user).put(handlers::user::update_user),
        )
        .route(
            "/users/{id}/reset-password",
            post(handlers::user::reset_password),
        )
        .route(
            "/platforms/{id}/unlock",
            post(handlers::platform::unlock_platform),
        )
        .route("/audit-logs", get(handlers::audit_log::list_audit_logs))
        .route_layer(from_fn(require_roles(ADMIN_ONLY)))
}

/// 组装 `/api/crm` 下的全部路由
///
/// `upload_limit` 为单个文件的字节上限，上传路由的请求体上限在此基础上放宽。
pub fn api_routes(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .merge(auth_routes())
        .merge(workspace_routes(upload_limit))
        .merge(staff_routes())
        .merge(admin_routes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_construction() {
        let _auth = auth_routes();
        let _workspace = workspace_routes(1024);
        let _staff = staff_routes();
        let _admin = admin_routes();
        let _api = api_routes(10 * 1024 * 1024);
    }
}
