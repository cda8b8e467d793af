//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 收集指标，通过独立端口暴露给 Prometheus。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 安装 recorder 并启动 `/metrics` 服务器
pub async fn init(service_name: &str, port: u16) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 描述预定义的指标，描述会出现在 /metrics 的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    metrics::describe_counter!(
        "crm_client_transitions_total",
        "Client status transitions by target status"
    );
    metrics::describe_counter!(
        "crm_verification_attempts_total",
        "Platform verification attempts by platform and outcome"
    );
    metrics::describe_counter!(
        "crm_notifications_created_total",
        "Notifications created by kind"
    );
    metrics::describe_counter!("crm_exports_total", "Generated exports by format");
    metrics::describe_counter!("crm_uploads_total", "Stored document uploads");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录客户状态流转
#[inline]
pub fn record_client_transition(to_status: &str) {
    metrics::counter!("crm_client_transitions_total", "to" => to_status.to_string()).increment(1);
}

/// 记录平台验证尝试
#[inline]
pub fn record_verification_attempt(platform: &str, outcome: &str) {
    metrics::counter!(
        "crm_verification_attempts_total",
        "platform" => platform.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// 记录通知创建数
#[inline]
pub fn record_notifications(kind: &str, count: u64) {
    metrics::counter!("crm_notifications_created_total", "kind" => kind.to_string())
        .increment(count);
}

/// 记录导出
#[inline]
pub fn record_export(format: &str) {
    metrics::counter!("crm_exports_total", "format" => format.to_string()).increment(1);
}

/// 记录上传
#[inline]
pub fn record_upload() {
    metrics::counter!("crm_uploads_total").increment(1);
}
