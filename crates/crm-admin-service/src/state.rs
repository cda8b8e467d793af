//! 应用状态定义

use std::sync::Arc;

use crm_core::service::CrmServices;
use crm_shared::config::AppConfig;
use sqlx::PgPool;

use crate::auth::JwtManager;
use crate::storage::LocalStorage;

/// Axum 应用共享状态
///
/// 业务服务与配置通过 Arc 在 handler 间共享
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL 连接池，审计日志与就绪探针直接使用
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub jwt_manager: Arc<JwtManager>,
    pub services: Arc<CrmServices>,
}

impl AppState {
    /// 以本地磁盘存储装配全部服务
    pub fn new(pool: PgPool, config: AppConfig) -> Self {
        let store = Arc::new(LocalStorage::new(&config.storage.upload_dir));
        let services = CrmServices::new(
            pool.clone(),
            config.business.clone(),
            config.storage.clone(),
            store,
        );
        let jwt_manager = JwtManager::new(&config.auth);

        Self {
            pool,
            config: Arc::new(config),
            jwt_manager: Arc::new(jwt_manager),
            services: Arc::new(services),
        }
    }
}
