//! 操作审计中间件
//!
//! 记录所有成功的写操作（POST/PUT/PATCH/DELETE）到 operation_logs 表。
//! 与客户事件日志相互独立：事件日志记录业务事实，这里记录谁在何时调用了哪个接口。

use axum::{
    extract::State,
    http::{Method, Request},
    middleware::Next,
    response::Response,
};
use sqlx::PgPool;
use tracing::{debug, error};

use crate::auth::Claims;
use crate::state::AppState;

const API_PREFIX: &str = "/api/crm/";

/// 一条待写入的审计记录
#[derive(Debug, Clone, PartialEq)]
struct AuditEntry {
    operator_id: i64,
    operator_name: String,
    module: String,
    action: String,
    target_type: Option<String>,
    target_id: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
}

/// 审计中间件：写操作成功后异步写入操作日志，写入失败不影响业务响应
pub async fn audit_middleware(
    State(state): State<AppState>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    if !is_write_method(&method) {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    // 登录、刷新等认证行为不属于业务操作
    if !path.starts_with(API_PREFIX) || path.starts_with("/api/crm/auth/") {
        return next.run(request).await;
    }

    let claims = request.extensions().get::<Claims>().cloned();
    let ip_address = extract_client_ip(&request);
    let user_agent = request
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let response = next.run(request).await;

    if !response.status().is_success() {
        return response;
    }
    let Some(claims) = claims else {
        return response;
    };
    let Ok(operator_id) = claims.sub.parse::<i64>() else {
        return response;
    };

    let (module, action) = parse_module_action(&path, &method);
    let (target_type, target_id) = extract_target(&path);
    let entry = AuditEntry {
        operator_id,
        operator_name: claims.name,
        module,
        action,
        target_type,
        target_id,
        ip_address,
        user_agent,
    };

    let pool = state.pool.clone();
    tokio::spawn(async move {
        write_audit_log(&pool, &entry).await;
    });

    response
}

fn is_write_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

fn segments(path: &str) -> Vec<&str> {
    path.strip_prefix(API_PREFIX)
        .unwrap_or(path)
        .split('/')
        .filter(|s| !s.is_empty())
        .collect()
}

fn is_id(segment: &str) -> bool {
    !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit())
}

/// 解析模块与动作
///
/// `/api/crm/{module}/...` 第一段为模块；`/{module}/{id}/{verb}` 形式的子动作
/// （如 approve、close）直接作为动作名，其余按 HTTP 方法映射。
fn parse_module_action(path: &str, method: &Method) -> (String, String) {
    let segments = segments(path);
    let module = segments.first().copied().unwrap_or("unknown").to_string();

    if segments.len() >= 3 && is_id(segments[1]) {
        return (module, segments[2..].join("_").replace('-', "_"));
    }

    let action = match *method {
        Method::POST => "create",
        Method::PUT | Method::PATCH => "update",
        Method::DELETE => "delete",
        _ => "unknown",
    };
    (module, action.to_string())
}

/// 提取操作目标，如 `/api/crm/clients/12/approve` -> ("client", "12")
fn extract_target(path: &str) -> (Option<String>, Option<String>) {
    let segments = segments(path);
    if segments.len() >= 2 && is_id(segments[1]) {
        let target_type = segments[0].strip_suffix('s').unwrap_or(segments[0]);
        return (Some(target_type.to_string()), Some(segments[1].to_string()));
    }
    (None, None)
}

/// 优先取反向代理设置的 X-Forwarded-For 第一个地址
fn extract_client_ip(request: &Request<axum::body::Body>) -> Option<String> {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            request
                .headers()
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        })
}

async fn write_audit_log(pool: &PgPool, entry: &AuditEntry) {
    let result = sqlx::query(
        r#"
        INSERT INTO operation_logs
            (operator_id, operator_name, module, action, target_type, target_id, ip_address, user_agent)
        VALUES
            ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(entry.operator_id)
    .bind(&entry.operator_name)
    .bind(&entry.module)
    .bind(&entry.action)
    .bind(&entry.target_type)
    .bind(&entry.target_id)
    .bind(&entry.ip_address)
    .bind(&entry.user_agent)
    .execute(pool)
    .await;

    match result {
        Ok(_) => debug!(
            operator_id = entry.operator_id,
            module = %entry.module,
            action = %entry.action,
            "审计日志已记录"
        ),
        Err(e) => error!(
            error = %e,
            operator_id = entry.operator_id,
            module = %entry.module,
            action = %entry.action,
            "审计日志写入失败"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_module_action() {
        let cases = [
            ("/api/crm/clients", Method::POST, "clients", "create"),
            ("/api/crm/clients/5", Method::PUT, "clients", "update"),
            ("/api/crm/clients/5/approve", Method::POST, "clients", "approve"),
            ("/api/crm/platforms/9/request-verification", Method::POST, "platforms", "request_verification"),
            ("/api/crm/profit-share-rules/3/status", Method::PATCH, "profit-share-rules", "status"),
            ("/api/crm/notifications/read-all", Method::POST, "notifications", "create"),
        ];
        for (path, method, module, action) in cases {
            assert_eq!(
                parse_module_action(path, &method),
                (module.to_string(), action.to_string()),
                "{path}"
            );
        }
    }

    #[test]
    fn test_extract_target_with_id() {
        let (t, id) = extract_target("/api/crm/clients/123/close");
        assert_eq!(t.as_deref(), Some("client"));
        assert_eq!(id.as_deref(), Some("123"));

        let (t, _) = extract_target("/api/crm/bonus-pools/7/settle");
        assert_eq!(t.as_deref(), Some("bonus-pool"));
    }

    #[test]
    fn test_extract_target_without_id() {
        assert_eq!(extract_target("/api/crm/clients"), (None, None));
        assert_eq!(extract_target("/api/crm/notifications/read-all"), (None, None));
    }

    #[test]
    fn test_is_write_method() {
        assert!(is_write_method(&Method::POST));
        assert!(is_write_method(&Method::PATCH));
        assert!(is_write_method(&Method::DELETE));
        assert!(!is_write_method(&Method::GET));
        assert!(!is_write_method(&Method::OPTIONS));
    }

    #[test]
    fn test_extract_client_ip() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(extract_client_ip(&request).as_deref(), Some("203.0.113.7"));

        let request = Request::builder()
            .header("x-real-ip", "198.51.100.4")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(extract_client_ip(&request).as_deref(), Some("198.51.100.4"));
    }
}
