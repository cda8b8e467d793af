//! 应用组装
//!
//! 路由、探针与中间件栈在这里拼装，main 与集成测试共用同一个入口。

use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderName, HeaderValue, header},
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use crm_shared::database::Database;
use crm_shared::observability::middleware as obs_middleware;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::middleware::{audit_middleware, auth_middleware};
use crate::routes;
use crate::state::AppState;

/// 非生产环境未配置时默认允许的前端地址
const DEV_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://localhost:5173"];

/// 构建完整的 Router
///
/// 中间件自外向内：request_id → http_tracing → cors → auth → security_headers → audit
pub fn build_app(state: AppState) -> Router {
    let upload_limit = state.services.documents.max_upload_bytes();
    let cors = cors_layer(&state.config.server.cors_origins, state.config.is_production());

    Router::new()
        .nest("/api/crm", routes::api_routes(upload_limit))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // 审计中间件位于 auth 之后，可读取 Claims
        .layer(middleware::from_fn_with_state(state.clone(), audit_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        // CORS 位于认证之外，预检请求不携带 Token
        .layer(cors)
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state)
}

fn cors_layer(origins: &[String], production: bool) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        if production {
            warn!("CORS 允许任意来源在生产环境中不安全，请配置具体域名");
        }
        info!("CORS allowed origins: *");
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    // 生产环境未配置时不允许任何跨域来源
    let configured: Vec<&str> = if origins.is_empty() && !production {
        DEV_ORIGINS.to_vec()
    } else {
        origins.iter().map(String::as_str).collect()
    };
    info!(origins = ?configured, "CORS allowed origins");

    let parsed: Vec<HeaderValue> = configured
        .iter()
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([header::CONTENT_DISPOSITION])
}

/// 为所有响应注入 HTTP 安全头
async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    // 旧的 XSS 过滤器显式关闭
    headers.insert(
        HeaderName::from_static("x-xss-protection"),
        HeaderValue::from_static("0"),
    );
    response
}

/// 存活探针
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": state.config.service_name,
    }))
}

/// 就绪探针：检查数据库连接
async fn readiness_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let database = match Database::from_pool(state.pool.clone()).health_check().await {
        Ok(latency) => serde_json::json!({
            "status": "ok",
            "latencyMs": latency.as_millis() as u64,
        }),
        Err(e) => {
            warn!(error = %e, "就绪检查：数据库不可用");
            serde_json::json!({ "status": "fail" })
        }
    };
    let ready = database["status"] == "ok";

    Json(serde_json::json!({
        "status": if ready { "ok" } else { "degraded" },
        "service": state.config.service_name,
        "checks": { "database": database },
    }))
}
