//! 客户文件上传与下载
//!
//! 文件内容交给 [`FileStore`] 保存，数据库只记录元数据与 SHA-256。

use std::sync::Arc;

use async_trait::async_trait;
use crm_shared::config::StorageConfig;
use crm_shared::observability::metrics;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::load_client;
use crate::error::{CrmError, Result};
use crate::models::{Actor, Document, EventType, NewDocument, NewEvent};
use crate::repository::{ClientRepositoryTrait, DocumentRepositoryTrait};

const MAX_FILE_NAME_CHARS: usize = 200;

/// 文件内容存储，路径为相对存储根目录的路径
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn save(&self, path: &str, bytes: &[u8]) -> std::io::Result<()>;
    async fn load(&self, path: &str) -> std::io::Result<Vec<u8>>;
    async fn delete(&self, path: &str) -> std::io::Result<()>;
}

/// 清理客户端提供的文件名：去掉路径部分，非常规字符替换为下划线
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_NAME_CHARS)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "application/pdf" => "pdf",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        _ => "bin",
    }
}

#[derive(Debug, Clone)]
pub struct UploadInput {
    pub client_id: i64,
    pub category: Option<String>,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

pub struct DocumentService {
    clients: Arc<dyn ClientRepositoryTrait>,
    documents: Arc<dyn DocumentRepositoryTrait>,
    store: Arc<dyn FileStore>,
    config: StorageConfig,
}

impl DocumentService {
    pub fn new(
        clients: Arc<dyn ClientRepositoryTrait>,
        documents: Arc<dyn DocumentRepositoryTrait>,
        store: Arc<dyn FileStore>,
        config: StorageConfig,
    ) -> Self {
        Self {
            clients,
            documents,
            store,
            config,
        }
    }

    /// 上传限制（字节），HTTP 层据此设置请求体上限
    pub fn max_upload_bytes(&self) -> usize {
        self.config.max_upload_bytes
    }

    #[instrument(skip(self, input), fields(actor = actor.user_id, client_id = input.client_id, size = input.bytes.len()))]
    pub async fn upload(&self, actor: &Actor, input: UploadInput) -> Result<Document> {
        if input.bytes.is_empty() {
            return Err(CrmError::Validation("文件内容为空".to_string()));
        }
        if input.bytes.len() > self.config.max_upload_bytes {
            return Err(CrmError::FileTooLarge {
                max_bytes: self.config.max_upload_bytes,
            });
        }
        let content_type = input.content_type.trim().to_ascii_lowercase();
        if !self.config.allowed_content_types.contains(&content_type) {
            return Err(CrmError::UnsupportedFileType(content_type));
        }

        let client = load_client(self.clients.as_ref(), actor, input.client_id).await?;
        if client.status.is_terminal() {
            return Err(CrmError::InvalidStatusTransition {
                entity: "客户",
                from: client.status.as_str().to_string(),
                to: "document_uploaded".to_string(),
            });
        }

        let sha256 = hex::encode(Sha256::digest(&input.bytes));
        let storage_path = format!(
            "{}/{}.{}",
            client.id,
            Uuid::now_v7(),
            extension_for(&content_type)
        );
        self.store.save(&storage_path, &input.bytes).await?;

        let original_name = sanitize_file_name(&input.file_name);
        let event = NewEvent::client(client.id, actor.user_id, EventType::DocumentUploaded)
            .with_payload(json!({
                "fileName": original_name,
                "category": input.category,
                "sizeBytes": input.bytes.len(),
            }));
        let new_document = NewDocument {
            client_id: client.id,
            uploaded_by: actor.user_id,
            category: input.category.filter(|c| !c.trim().is_empty()),
            original_name,
            storage_path: storage_path.clone(),
            content_type,
            size_bytes: input.bytes.len() as i64,
            sha256,
        };

        match self.documents.create(&new_document, &event).await {
            Ok(document) => {
                metrics::record_upload();
                info!(document_id = document.id, "文件上传成功");
                Ok(document)
            }
            Err(e) => {
                // 元数据写入失败时清理已保存的文件
                if let Err(cleanup) = self.store.delete(&storage_path).await {
                    warn!(path = %storage_path, error = %cleanup, "清理上传文件失败");
                }
                Err(e)
            }
        }
    }

    pub async fn list(&self, actor: &Actor, client_id: i64) -> Result<Vec<Document>> {
        load_client(self.clients.as_ref(), actor, client_id).await?;
        self.documents.list_by_client(client_id).await
    }

    /// 返回元数据和文件内容
    pub async fn download(&self, actor: &Actor, id: i64) -> Result<(Document, Vec<u8>)> {
        let document = self
            .documents
            .get(id)
            .await?
            .ok_or(CrmError::DocumentNotFound(id))?;
        load_client(self.clients.as_ref(), actor, document.client_id)
            .await
            .map_err(|e| if e.is_not_found() { CrmError::DocumentNotFound(id) } else { e })?;

        let bytes = self.store.load(&document.storage_path).await?;
        Ok((document, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClientStatus;
    use crate::models::test_fixtures::{agent, client_in};
    use crate::repository::{MockClientRepositoryTrait, MockDocumentRepositoryTrait};
    use chrono::Utc;

    fn document_from(new: &NewDocument) -> Document {
        Document {
            id: 1,
            client_id: new.client_id,
            uploaded_by: new.uploaded_by,
            category: new.category.clone(),
            original_name: new.original_name.clone(),
            storage_path: new.storage_path.clone(),
            content_type: new.content_type.clone(),
            size_bytes: new.size_bytes,
            sha256: new.sha256.clone(),
            created_at: Utc::now(),
        }
    }

    fn clients() -> MockClientRepositoryTrait {
        let mut clients = MockClientRepositoryTrait::new();
        clients
            .expect_get()
            .returning(|id| Ok(Some(client_in(id, 7, ClientStatus::Intake))));
        clients
    }

    fn input(bytes: &[u8], content_type: &str) -> UploadInput {
        UploadInput {
            client_id: 3,
            category: Some("id".to_string()),
            file_name: "../../etc/护照 scan.pdf".to_string(),
            content_type: content_type.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\docs\\a b.pdf"), "a_b.pdf");
        assert_eq!(sanitize_file_name("护照.png"), "护照.png");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name("/"), "file");
    }

    #[tokio::test]
    async fn test_upload_stores_file_and_checksum() {
        let mut store = MockFileStore::new();
        store
            .expect_save()
            .withf(|path, bytes| path.starts_with("3/") && path.ends_with(".pdf") && bytes == b"%PDF-1.4")
            .times(1)
            .returning(|_, _| Ok(()));
        let mut documents = MockDocumentRepositoryTrait::new();
        documents
            .expect_create()
            .withf(|d, e| {
                d.original_name == "护照_scan.pdf"
                    && d.sha256.len() == 64
                    && e.event_type == EventType::DocumentUploaded
            })
            .returning(|d, _| Ok(document_from(d)));

        let service = DocumentService::new(
            Arc::new(clients()),
            Arc::new(documents),
            Arc::new(store),
            StorageConfig::default(),
        );
        let actor = agent(7, 0, None).actor();
        let document = service
            .upload(&actor, input(b"%PDF-1.4", "Application/PDF"))
            .await
            .unwrap();
        assert_eq!(document.content_type, "application/pdf");
    }

    #[tokio::test]
    async fn test_upload_rejects_size_and_type() {
        let config = StorageConfig {
            max_upload_bytes: 4,
            ..Default::default()
        };
        let service = DocumentService::new(
            Arc::new(MockClientRepositoryTrait::new()),
            Arc::new(MockDocumentRepositoryTrait::new()),
            Arc::new(MockFileStore::new()),
            config,
        );
        let actor = agent(7, 0, None).actor();

        let err = service.upload(&actor, input(b"12345", "application/pdf")).await.unwrap_err();
        assert!(matches!(err, CrmError::FileTooLarge { max_bytes: 4 }));

        let err = service.upload(&actor, input(b"MZ", "application/x-msdownload")).await.unwrap_err();
        assert!(matches!(err, CrmError::UnsupportedFileType(_)));
    }

    #[tokio::test]
    async fn test_failed_insert_removes_file() {
        let mut store = MockFileStore::new();
        store.expect_save().returning(|_, _| Ok(()));
        store.expect_delete().times(1).returning(|_| Ok(()));
        let mut documents = MockDocumentRepositoryTrait::new();
        documents
            .expect_create()
            .returning(|_, _| Err(CrmError::Internal("insert failed".into())));

        let service = DocumentService::new(
            Arc::new(clients()),
            Arc::new(documents),
            Arc::new(store),
            StorageConfig::default(),
        );
        let actor = agent(7, 0, None).actor();
        assert!(service.upload(&actor, input(b"\x89PNG", "image/png")).await.is_err());
    }
}
