//! HTTP 层集成测试
//!
//! 使用懒连接池构造完整 Router：这里覆盖的场景（探针、认证、角色守卫、参数校验）
//! 都在访问数据库之前返回，因此无需启动 PostgreSQL。

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::Utc;
use crm_admin_service::{AppState, build_app};
use crm_core::models::{User, UserRole, UserStatus};
use crm_shared::test_utils::{TestAssertions, test_app_config};
use fake::Fake;
use fake::faker::name::en::Name;
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

fn test_state() -> AppState {
    let config = test_app_config();
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database.url)
        .expect("构造懒连接池失败");
    AppState::new(pool, config)
}

fn user(id: i64, role: UserRole) -> User {
    let now = Utc::now();
    User {
        id,
        username: format!("user{id}"),
        password_hash: String::new(),
        display_name: Name().fake(),
        email: None,
        role,
        status: UserStatus::Active,
        supervisor_id: None,
        star_level: 0,
        failed_login_attempts: 0,
        locked_until: None,
        last_login_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn token_for(state: &AppState, role: UserRole) -> String {
    let (token, _) = state
        .jwt_manager
        .generate_token(&user(42, role))
        .expect("签发 Token 失败");
    token
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app.oneshot(request).await.expect("请求失败");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.expect("读取响应失败").to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_health_is_public_and_has_security_headers() {
    let app = build_app(test_state());
    let (status, headers, body) = send(app, get("/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "crm-admin-service");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = build_app(test_state());
    let (status, _, body) = send(app, get("/api/crm/clients", None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    TestAssertions::assert_error_code(&body, "UNAUTHORIZED");
    TestAssertions::assert_json_has_field(&body, "message");
}

#[tokio::test]
async fn test_invalid_token_is_unauthorized() {
    let app = build_app(test_state());
    let (status, _, body) = send(app, get("/api/crm/todos", Some("not.a.jwt"))).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_agent_blocked_from_admin_routes() {
    let state = test_state();
    let token = token_for(&state, UserRole::Agent);

    for uri in ["/api/crm/users", "/api/crm/audit-logs", "/api/crm/bonus-pools"] {
        let app = build_app(state.clone());
        let (status, _, body) = send(app, get(uri, Some(&token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
        TestAssertions::assert_error_code(&body, "FORBIDDEN");
    }
}

#[tokio::test]
async fn test_agent_cannot_unlock_platform_or_close_client() {
    let state = test_state();
    let token = token_for(&state, UserRole::Agent);

    let app = build_app(state.clone());
    let (status, _, _) = send(app, post_json("/api/crm/platforms/1/unlock", Some(&token), Value::Null)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let app = build_app(state);
    let (status, _, _) = send(
        app,
        post_json(
            "/api/crm/clients/1/close",
            Some(&token),
            serde_json::json!({ "reason": "done" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_backoffice_blocked_from_audit_logs() {
    let state = test_state();
    let token = token_for(&state, UserRole::Backoffice);

    let (status, _, body) = send(build_app(state), get("/api/crm/audit-logs", Some(&token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    TestAssertions::assert_error_code(&body, "FORBIDDEN");
}

#[tokio::test]
async fn test_login_validates_before_lookup() {
    let app = build_app(test_state());
    let (status, _, body) = send(
        app,
        post_json(
            "/api/crm/auth/login",
            None,
            serde_json::json!({ "username": "", "password": "" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    TestAssertions::assert_error_code(&body, "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_cors_preflight_skips_auth() {
    let app = build_app(test_state());
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/crm/clients")
        .header(header::ORIGIN, "http://localhost:5173")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let (status, headers, _) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:5173"
    );
}

#[tokio::test]
async fn test_malformed_json_uses_tagged_error() {
    let app = build_app(test_state());
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/crm/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, _, body) = send(app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    TestAssertions::assert_error_code(&body, "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_bad_path_and_query_use_tagged_error() {
    let state = test_state();
    let token = token_for(&state, UserRole::Agent);

    for uri in ["/api/crm/clients/abc", "/api/crm/clients?page=abc"] {
        let (status, _, body) = send(build_app(state.clone()), get(uri, Some(&token))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["success"], false, "{uri}");
        TestAssertions::assert_error_code(&body, "VALIDATION_ERROR");
    }
}
