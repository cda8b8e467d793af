//! 客户文件上传与下载 HTTP 处理器
//!
//! 上传使用 multipart/form-data：`file` 为文件内容，`category` 为可选分类。

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State, multipart::MultipartError};
use axum::http::StatusCode;
use axum::response::Response;
use crm_core::CrmError;
use crm_core::models::Document;
use crm_core::service::UploadInput;

use crate::dto::ApiResponse;
use crate::error::{AdminError, Result};
use crate::export::attachment;
use crate::extract::{Json, Path};
use crate::middleware::CurrentActor;
use crate::state::AppState;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// 请求体超过上限时按业务错误 FILE_TOO_LARGE 返回
fn multipart_error(err: MultipartError, max_bytes: usize) -> AdminError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        CrmError::FileTooLarge { max_bytes }.into()
    } else {
        err.into()
    }
}

/// 上传文件
///
/// POST /api/crm/clients/{id}/documents
pub async fn upload_document(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(client_id): Path<i64>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<ApiResponse<Document>>> {
    let mut multipart = multipart?;
    let documents = &state.services.documents;
    let max_bytes = documents.max_upload_bytes();

    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut category: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        match field.name() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or(DEFAULT_CONTENT_TYPE)
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(e, max_bytes))?;
                file = Some((file_name, content_type, bytes.to_vec()));
            }
            Some("category") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, max_bytes))?;
                category = Some(text);
            }
            // 其余字段忽略
            _ => {}
        }
    }

    let (file_name, content_type, bytes) =
        file.ok_or_else(|| AdminError::Validation("缺少 file 字段".to_string()))?;

    let document = documents
        .upload(
            &actor,
            UploadInput {
                client_id,
                category,
                file_name,
                content_type,
                bytes,
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(document)))
}

/// 客户的文件列表
///
/// GET /api/crm/clients/{id}/documents
pub async fn list_documents(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(client_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<Document>>>> {
    let documents = state.services.documents.list(&actor, client_id).await?;
    Ok(Json(ApiResponse::success(documents)))
}

/// 下载文件
///
/// GET /api/crm/documents/{id}/download
pub async fn download_document(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Response> {
    let (document, bytes) = state.services.documents.download(&actor, id).await?;
    Ok(attachment(bytes, &document.content_type, &document.original_name))
}
