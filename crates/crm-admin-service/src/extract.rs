//! 请求提取器
//!
//! 包装 axum 的 `Json`、`Path`、`Query`，解析失败时返回统一的 `VALIDATION_ERROR` 响应体，
//! 而不是 axum 默认的纯文本。`Json` 同时用作响应类型。

use axum::extract::{FromRequest, FromRequestParts, OptionalFromRequest, Request};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::AdminError;

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AdminError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// 未携带 Content-Type 的空请求体视为 `None`
impl<T, S> OptionalFromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AdminError;

    async fn from_request(req: Request, state: &S) -> Result<Option<Self>, Self::Rejection> {
        let body = <axum::Json<T> as OptionalFromRequest<S>>::from_request(req, state).await?;
        Ok(body.map(|axum::Json(value)| Json(value)))
    }
}

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AdminError))]
pub struct Path<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AdminError))]
pub struct Query<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{StatusCode, header};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Payload {
        #[allow(dead_code)]
        name: String,
    }

    fn json_request(body: &'static str) -> Request {
        Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_malformed_json_becomes_validation_error() {
        let err = <Json<Payload> as FromRequest<()>>::from_request(json_request("{not json"), &())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_optional_json_without_body_is_none() {
        let request = Request::builder().method("POST").uri("/").body(Body::empty()).unwrap();
        let body = <Json<Payload> as OptionalFromRequest<()>>::from_request(request, &())
            .await
            .unwrap();
        assert!(body.is_none());
    }

    #[tokio::test]
    async fn test_optional_json_still_rejects_bad_body() {
        let err = <Json<Payload> as OptionalFromRequest<()>>::from_request(json_request("[]"), &())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_bad_query_becomes_validation_error() {
        #[derive(Debug, Deserialize)]
        struct Paging {
            #[allow(dead_code)]
            page: i64,
        }

        let (mut parts, _) = Request::builder()
            .uri("/?page=abc")
            .body(Body::empty())
            .unwrap()
            .into_parts();
        let err = <Query<Paging> as FromRequestParts<()>>::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }
}
