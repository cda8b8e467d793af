//! CRM 管理后台错误类型定义
//!
//! 业务规则错误来自 crm-core，这里只补充认证、请求解析等 HTTP 层特有的错误，
//! 并统一转换为 `{ success, code, message, data }` 响应。

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use crm_core::CrmError;
use serde_json::json;

const GENERIC_SERVER_ERROR: &str = "服务内部错误，请稍后重试";

/// 管理后台错误类型
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    // 认证错误
    #[error("未授权: {0}")]
    Unauthorized(String),
    #[error("禁止访问: {0}")]
    Forbidden(String),
    #[error("用户名或密码错误")]
    InvalidCredentials,
    #[error("用户已被禁用")]
    UserDisabled,
    #[error("账户已被锁定，请于 {until} 之后重试")]
    UserLocked { until: DateTime<Utc> },

    // 请求错误
    #[error("参数验证失败: {0}")]
    Validation(String),
    #[error("上传内容无法处理: {0}")]
    InvalidUpload(String),
    #[error("资源不存在: {0}")]
    NotFound(String),

    // 业务规则错误
    #[error(transparent)]
    Business(#[from] CrmError),

    // 系统错误
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("内部错误: {0}")]
    Internal(String),
}

impl AdminError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::UserDisabled | Self::UserLocked { .. } => {
                StatusCode::FORBIDDEN
            }
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::InvalidUpload(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Business(e) => business_status(e),
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::UserDisabled => "USER_DISABLED",
            Self::UserLocked { .. } => "USER_LOCKED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidUpload(_) => "INVALID_UPLOAD",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Business(e) => e.code(),
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn is_system_error(&self) -> bool {
        match self {
            Self::Database(_) | Self::Internal(_) => true,
            Self::Business(e) => e.is_system_error(),
            _ => false,
        }
    }

    /// 随错误返回的附加数据
    fn data(&self) -> serde_json::Value {
        match self {
            Self::UserLocked { until } => json!({ "lockedUntil": until }),
            Self::Business(e) => e.details().unwrap_or(serde_json::Value::Null),
            _ => serde_json::Value::Null,
        }
    }
}

fn business_status(err: &CrmError) -> StatusCode {
    if err.is_not_found() {
        return StatusCode::NOT_FOUND;
    }
    if err.is_system_error() {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    match err {
        CrmError::Forbidden(_) => StatusCode::FORBIDDEN,
        CrmError::Validation(_) | CrmError::InvalidAmount(_) | CrmError::InvalidProfitShareRule(_) => {
            StatusCode::BAD_REQUEST
        }
        CrmError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        CrmError::UnsupportedFileType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        // 其余都是与当前状态冲突的业务规则
        _ => StatusCode::CONFLICT,
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志
        let message = if self.is_system_error() {
            tracing::error!(error = %self, code = self.error_code(), "请求处理失败");
            GENERIC_SERVER_ERROR.to_string()
        } else {
            self.to_string()
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": self.data(),
        });

        (status, axum::Json(body)).into_response()
    }
}

/// 从 validator 错误转换
impl From<validator::ValidationErrors> for AdminError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

/// 从 JSON 序列化错误转换
impl From<serde_json::Error> for AdminError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON 处理错误: {}", err))
    }
}

impl From<JsonRejection> for AdminError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(format!("请求体解析失败: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for AdminError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(format!("路径参数无效: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for AdminError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(format!("查询参数无效: {}", rejection.body_text()))
    }
}

impl From<MultipartRejection> for AdminError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::InvalidUpload(rejection.body_text())
    }
}

impl From<axum::extract::multipart::MultipartError> for AdminError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        Self::InvalidUpload(err.body_text())
    }
}

/// 服务层 Result 类型别名
pub type Result<T> = std::result::Result<T, AdminError>;
