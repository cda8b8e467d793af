//! PostgreSQL 连接池
//!
//! 启动时建池并执行内嵌迁移，就绪探针通过 [`Database::health_check`] 获取往返耗时。

use std::time::{Duration, Instant};

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument};

use crate::config::DatabaseConfig;
use crate::error::Result;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    #[instrument(skip(config), fields(target = %redact_url(&config.url)))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await?;

        info!(
            max = config.max_connections,
            min = config.min_connections,
            "数据库连接池已建立"
        );
        Ok(Self { pool })
    }

    /// 包装已有连接池，集成测试与就绪探针使用
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 执行一次 `SELECT 1`，返回往返耗时
    pub async fn health_check(&self) -> Result<Duration> {
        let started = Instant::now();
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(started.elapsed())
    }

    /// 执行调用方通过 `sqlx::migrate!` 嵌入的迁移
    #[instrument(skip_all)]
    pub async fn run_migrations(&self, migrator: &Migrator) -> Result<()> {
        migrator.run(&self.pool).await?;
        info!(count = migrator.iter().count(), "数据库迁移已应用");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("数据库连接池已关闭");
    }
}

/// 隐去连接串中的口令，只保留主机与库名用于日志
fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return "<invalid>".to_string();
    };
    let host = rest.rsplit_once('@').map_or(rest, |(_, host)| host);
    format!("{scheme}://{host}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_url_hides_credentials() {
        assert_eq!(
            redact_url("postgres://crm:s3cr@t@db:5432/crm"),
            "postgres://db:5432/crm"
        );
        assert_eq!(
            redact_url("postgres://localhost/crm"),
            "postgres://localhost/crm"
        );
        assert_eq!(redact_url("not a url"), "<invalid>");
    }

    #[tokio::test]
    #[ignore] // 需要数据库连接
    async fn test_health_check_reports_latency() {
        let config = crate::test_utils::test_database_config();
        let db = Database::connect(&config).await.unwrap();
        let latency = db.health_check().await.unwrap();
        assert!(latency < Duration::from_secs(5));
        db.close().await;
    }
}
