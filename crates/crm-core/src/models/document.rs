//! 客户上传文件

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: i64,
    pub client_id: i64,
    pub uploaded_by: i64,
    pub category: Option<String>,
    pub original_name: String,
    /// 相对上传根目录的存储路径
    #[serde(skip_serializing)]
    pub storage_path: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub client_id: i64,
    pub uploaded_by: i64,
    pub category: Option<String>,
    pub original_name: String,
    pub storage_path: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub sha256: String,
}
