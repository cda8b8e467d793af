//! DTO 模块
//!
//! 请求体、查询参数与响应结构

pub mod request;
pub mod response;

pub use request::*;
pub use response::{
    ApiResponse, CountResponse, LoginResponse, OperationLogDto, PageResponse, RefreshResponse,
};
