//! 报表导出
//!
//! CSV 使用 `csv` crate，PDF 使用 `lopdf` 直接生成简单的文本页面。

pub mod csv;
pub mod pdf;

use axum::{
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};

/// 作为附件下载的响应
pub fn attachment(bytes: Vec<u8>, content_type: &str, file_name: &str) -> Response {
    let content_type = HeaderValue::from_str(content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response()
}
