//! 客户全流程集成测试
//!
//! 需要 PostgreSQL（TEST_DATABASE_URL），默认忽略：
//! `cargo test -p crm-core -- --ignored`

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal_macros::dec;
use tokio::sync::Mutex;

use crm_core::models::{
    Actor, ClientStatus, NewUser, PlatformKind, User, UserRole, VerificationOutcome,
    VerificationStatus,
};
use crm_core::repository::{UserRepository, UserRepositoryTrait};
use crm_core::service::{CreateClientInput, CrmServices, FileStore, UploadInput};
use crm_core::{CrmError, MIGRATOR};
use crm_shared::config::{BusinessConfig, StorageConfig};
use crm_shared::database::Database;
use crm_shared::test_utils::{test_database_config, unique_username};

/// 内存文件存储
#[derive(Default)]
struct MemoryStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl FileStore for MemoryStore {
    async fn save(&self, path: &str, bytes: &[u8]) -> std::io::Result<()> {
        self.files.lock().await.insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn load(&self, path: &str) -> std::io::Result<Vec<u8>> {
        self.files
            .lock()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
    }

    async fn delete(&self, path: &str) -> std::io::Result<()> {
        self.files.lock().await.remove(path);
        Ok(())
    }
}

struct Fixture {
    services: CrmServices,
    users: UserRepository,
}

async fn setup() -> Fixture {
    let db = Database::connect(&test_database_config())
        .await
        .expect("连接测试数据库失败");
    db.run_migrations(&MIGRATOR).await.expect("迁移失败");

    let pool = db.pool().clone();
    Fixture {
        services: CrmServices::new(
            pool.clone(),
            BusinessConfig::default(),
            StorageConfig::default(),
            Arc::new(MemoryStore::default()),
        ),
        users: UserRepository::new(pool),
    }
}

impl Fixture {
    async fn user(&self, role: UserRole, star_level: i32, supervisor_id: Option<i64>) -> User {
        self.users
            .create(&NewUser {
                username: unique_username(role.as_str()),
                password_hash: "not-a-real-hash".to_string(),
                display_name: format!("测试{}", role.as_str()),
                email: None,
                role,
                supervisor_id,
                star_level,
            })
            .await
            .expect("创建用户失败")
    }

    async fn client_for(&self, agent: &Actor) -> i64 {
        self.services
            .clients
            .create(
                agent,
                CreateClientInput {
                    agent_id: None,
                    first_name: "Grace".to_string(),
                    last_name: "Hopper".to_string(),
                    email: None,
                    phone: Some("555-0199".to_string()),
                    state: Some("pa".to_string()),
                    notes: None,
                },
            )
            .await
            .expect("创建客户失败")
            .id
    }
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_intake_to_closure() {
    let fx = setup().await;
    let admin = fx.user(UserRole::Admin, 0, None).await.actor();
    let agent = fx.user(UserRole::Agent, 1, None).await.actor();
    let svc = &fx.services;

    let client_id = fx.client_for(&agent).await;

    let err = svc.clients.submit(&agent, client_id).await.unwrap_err();
    assert!(matches!(err, CrmError::NoPlatforms));

    let platform = svc
        .verification
        .add_platform(&agent, client_id, PlatformKind::Fanduel, Some("FD-1".into()))
        .await
        .unwrap();
    let dup = svc
        .verification
        .add_platform(&agent, client_id, PlatformKind::Fanduel, None)
        .await
        .unwrap_err();
    assert_eq!(dup.code(), "PLATFORM_EXISTS");

    svc.clients.submit(&agent, client_id).await.unwrap();
    let active = svc.clients.approve(&admin, client_id).await.unwrap();
    assert_eq!(active.status, ClientStatus::Active);

    svc.verification
        .update_balance(&admin, platform.id, dec!(120.50))
        .await
        .unwrap();
    let err = svc
        .closure
        .close(&admin, client_id, "结束合作")
        .await
        .unwrap_err();
    assert!(matches!(err, CrmError::OutstandingBalances { .. }));

    svc.verification
        .update_balance(&admin, platform.id, dec!(0))
        .await
        .unwrap();
    let closed = svc.closure.close(&admin, client_id, "结束合作").await.unwrap();
    assert_eq!(closed.status, ClientStatus::Closed);
    assert!(closed.closed_at.is_some());

    let events = svc
        .clients
        .list_events(&admin, client_id, Default::default())
        .await
        .unwrap();
    assert!(events.total >= 6);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_extension_limit() {
    let fx = setup().await;
    let admin = fx.user(UserRole::Admin, 0, None).await.actor();
    let agent = fx.user(UserRole::Agent, 0, None).await.actor();
    let svc = &fx.services;
    let client_id = fx.client_for(&agent).await;

    for _ in 0..3 {
        let request = svc
            .extensions
            .request(&agent, client_id, 7, "证件补寄中")
            .await
            .unwrap();
        let pending = svc
            .extensions
            .request(&agent, client_id, 7, "重复申请")
            .await
            .unwrap_err();
        assert!(matches!(pending, CrmError::ExtensionAlreadyPending));
        svc.extensions.approve(&admin, request.id, None).await.unwrap();
    }

    let err = svc
        .extensions
        .request(&agent, client_id, 7, "第四次")
        .await
        .unwrap_err();
    assert!(matches!(err, CrmError::ExtensionLimitReached { max: 3 }));

    let client = svc.clients.get(&admin, client_id).await.unwrap();
    assert_eq!(client.extension_count, 3);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_betmgm_lock_and_unlock() {
    let fx = setup().await;
    let admin = fx.user(UserRole::Admin, 0, None).await.actor();
    let agent = fx.user(UserRole::Agent, 0, None).await.actor();
    let svc = &fx.services;
    let client_id = fx.client_for(&agent).await;

    let platform = svc
        .verification
        .add_platform(&agent, client_id, PlatformKind::Betmgm, None)
        .await
        .unwrap();
    svc.verification
        .record_attempt(&admin, platform.id, VerificationOutcome::Failure { note: None })
        .await
        .unwrap();

    // 第二次尝试在冷却期内
    let err = svc
        .verification
        .record_attempt(&admin, platform.id, VerificationOutcome::Success)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VERIFICATION_COOLDOWN");

    let err = svc.verification.unlock(&admin, platform.id).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_STATUS_TRANSITION");

    let platforms = svc.verification.list_platforms(&agent, client_id).await.unwrap();
    assert_eq!(platforms[0].status, VerificationStatus::Failed);
    assert_eq!(platforms[0].attempts, 1);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_submission_notifies_staff_and_documents_upload() {
    let fx = setup().await;
    let admin_user = fx.user(UserRole::Admin, 0, None).await;
    let agent = fx.user(UserRole::Agent, 0, None).await.actor();
    let svc = &fx.services;
    let client_id = fx.client_for(&agent).await;

    svc.verification
        .add_platform(&agent, client_id, PlatformKind::Bank, None)
        .await
        .unwrap();
    let before = svc
        .notifications
        .unread_count(&admin_user.actor())
        .await
        .unwrap();
    svc.clients.submit(&agent, client_id).await.unwrap();
    let after = svc
        .notifications
        .unread_count(&admin_user.actor())
        .await
        .unwrap();
    assert_eq!(after, before + 1);

    let document = svc
        .documents
        .upload(
            &agent,
            UploadInput {
                client_id,
                category: Some("id".into()),
                file_name: "license.png".into(),
                content_type: "image/png".into(),
                bytes: b"\x89PNG\r\n".to_vec(),
            },
        )
        .await
        .unwrap();
    let (meta, bytes) = svc.documents.download(&agent, document.id).await.unwrap();
    assert_eq!(meta.original_name, "license.png");
    assert_eq!(bytes, b"\x89PNG\r\n");
}
