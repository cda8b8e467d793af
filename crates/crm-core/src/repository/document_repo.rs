//! 文件元数据仓储

use async_trait::async_trait;
use sqlx::PgPool;

use super::insert_event;
use super::traits::DocumentRepositoryTrait;
use crate::error::Result;
use crate::models::{Document, NewDocument, NewEvent};

const DOCUMENT_COLUMNS: &str = "id, client_id, uploaded_by, category, original_name, storage_path, \
     content_type, size_bytes, sha256, created_at";

pub struct DocumentRepository {
    pool: PgPool,
}

impl DocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentRepositoryTrait for DocumentRepository {
    async fn get(&self, id: i64) -> Result<Option<Document>> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1");
        let document = sqlx::query_as::<_, Document>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(document)
    }

    async fn list_by_client(&self, client_id: i64) -> Result<Vec<Document>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE client_id = $1 ORDER BY created_at DESC, id DESC"
        );
        let documents = sqlx::query_as::<_, Document>(&sql)
            .bind(client_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(documents)
    }

    async fn create(&self, document: &NewDocument, event: &NewEvent) -> Result<Document> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO documents (client_id, uploaded_by, category, original_name, storage_path,
                                   content_type, size_bytes, sha256)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {DOCUMENT_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, Document>(&sql)
            .bind(document.client_id)
            .bind(document.uploaded_by)
            .bind(&document.category)
            .bind(&document.original_name)
            .bind(&document.storage_path)
            .bind(&document.content_type)
            .bind(document.size_bytes)
            .bind(&document.sha256)
            .fetch_one(&mut *tx)
            .await?;

        insert_event(&mut tx, event).await?;
        tx.commit().await?;
        Ok(created)
    }
}
