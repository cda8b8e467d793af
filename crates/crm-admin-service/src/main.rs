//! CRM 管理后台服务入口

use anyhow::Context;
use crm_admin_service::{AppState, auth::hash_password, build_app};
use crm_shared::{config::AppConfig, database::Database, observability};
use rand::{Rng, distr::Alphanumeric};
use tokio::net::TcpListener;
use tracing::{info, warn};

const SERVICE_NAME: &str = "crm-admin-service";
const BOOTSTRAP_USERNAME: &str = "admin";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 配置：config/default.toml → config/{env}.toml → config/crm-admin-service.toml → CRM_ 环境变量
    let config = AppConfig::load(SERVICE_NAME).context("加载配置失败")?;
    let _guard = observability::init(&config.service_name, &config.observability).await?;

    info!(
        environment = %config.environment,
        addr = %config.server_addr(),
        "Starting {}",
        config.service_name
    );

    let db = Database::connect(&config.database).await?;
    if config.database.run_migrations {
        db.run_migrations(&crm_core::MIGRATOR).await?;
    }

    let state = AppState::new(db.pool().clone(), config.clone());
    bootstrap_admin(&state).await?;

    let app = build_app(state);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    // 收到 SIGTERM 或 Ctrl+C 后停止接收新连接，等待进行中的请求完成
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// 空库启动时创建初始管理员
///
/// 密码取自 CRM_BOOTSTRAP_ADMIN_PASSWORD，未设置时随机生成并只在日志中输出一次。
async fn bootstrap_admin(state: &AppState) -> anyhow::Result<()> {
    let password = match std::env::var("CRM_BOOTSTRAP_ADMIN_PASSWORD") {
        Ok(p) if !p.trim().is_empty() => p,
        _ => rand::rng()
            .sample_iter(&Alphanumeric)
            .take(20)
            .map(char::from)
            .collect(),
    };
    let password_hash = hash_password(&password)?;

    if let Some(admin) = state
        .services
        .users
        .bootstrap_admin(BOOTSTRAP_USERNAME, &password_hash)
        .await?
    {
        if std::env::var("CRM_BOOTSTRAP_ADMIN_PASSWORD").is_err() {
            warn!(
                username = %admin.username,
                password = %password,
                "已创建初始管理员，请登录后立即修改密码"
            );
        } else {
            info!(username = %admin.username, "已创建初始管理员");
        }
    }
    Ok(())
}

/// 监听关闭信号
///
/// 注册信号处理器失败时记录错误，该信号分支不再触发。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
