//! 响应 DTO 定义
//!
//! 所有接口统一返回 `{ success, code, message, data }`

use chrono::{DateTime, Utc};
use crm_core::models::{Page, User};
use serde::Serialize;

use super::request::PaginationParams;

/// 分页响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl<T> PageResponse<T> {
    pub fn new(items: Vec<T>, total: i64, page: i64, page_size: i64) -> Self {
        let total_pages = if page_size > 0 {
            (total + page_size - 1) / page_size
        } else {
            0
        };

        Self {
            items,
            total,
            page,
            page_size,
            total_pages,
        }
    }

    /// 由业务层的分页结果构造
    pub fn from_page(page: Page<T>, params: &PaginationParams) -> Self {
        Self::new(page.items, page.total, params.page(), params.page_size())
    }
}

/// API 统一响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self::success_with_message(data, "操作成功")
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    /// 无数据的成功响应
    pub fn success_empty() -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: None,
        }
    }
}

/// 登录响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: i64,
    pub user: User,
}

/// Token 刷新响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub token: String,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountResponse {
    pub count: i64,
}

/// 操作日志
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OperationLogDto {
    pub id: i64,
    pub operator_id: i64,
    pub operator_name: Option<String>,
    pub module: String,
    pub action: String,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages() {
        let page = PageResponse::new(vec![1, 2], 41, 1, 20);
        assert_eq!(page.total_pages, 3);
        let empty: PageResponse<i32> = PageResponse::new(vec![], 0, 1, 20);
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn test_from_page_uses_normalized_params() {
        let params = PaginationParams { page: 0, page_size: 500 };
        let page = PageResponse::from_page(Page::new(vec!["a"], 1), &params);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 100);
    }

    #[test]
    fn test_api_response_shape() {
        let json = serde_json::to_value(ApiResponse::success(42)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["code"], "SUCCESS");
        assert_eq!(json["data"], 42);

        let json = serde_json::to_value(ApiResponse::success_empty()).unwrap();
        assert!(json["data"].is_null());
    }
}
