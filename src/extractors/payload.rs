//! Body, query and path extractors whose rejections are [`AppError`], so malformed input gets
//! the same JSON envelope as every other failure.

use crate::error::AppError;
use async_trait::async_trait;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::{request::Parts, StatusCode};
use axum::Json;
use serde::de::DeserializeOwned;

/// Request body parsed as JSON.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

/// Query string parameters.
#[derive(Debug)]
pub struct QueryParams<T>(pub T);

/// Path parameters.
#[derive(Debug)]
pub struct PathParams<T>(pub T);

fn rejected(status: StatusCode, message: String) -> AppError {
    match status {
        StatusCode::UNSUPPORTED_MEDIA_TYPE => AppError::UnsupportedMediaType(message),
        StatusCode::PAYLOAD_TOO_LARGE => AppError::PayloadTooLarge(message),
        s if s.is_server_error() => AppError::Internal(message),
        _ => AppError::BadRequest(message),
    }
}

impl From<JsonRejection> for AppError {
    fn from(r: JsonRejection) -> Self {
        rejected(r.status(), r.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(r: QueryRejection) -> Self {
        rejected(r.status(), r.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(r: PathRejection) -> Self {
        rejected(r.status(), r.body_text())
    }
}

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}

#[async_trait]
impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(QueryParams(value))
    }
}

#[async_trait]
impl<T, S> FromRequestParts<S> for PathParams<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(PathParams(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::header::CONTENT_TYPE;
    use serde_json::Value;

    async fn body(content_type: Option<&str>, raw: &'static str) -> Result<JsonBody<Value>, AppError> {
        let mut req = axum::http::Request::builder().method("POST").uri("/accounts");
        if let Some(ct) = content_type {
            req = req.header(CONTENT_TYPE, ct);
        }
        JsonBody::from_request(req.body(Body::from(raw)).unwrap(), &()).await
    }

    #[tokio::test]
    async fn body_rejections_become_app_errors() {
        assert!(matches!(
            body(Some("application/json"), "{not json").await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(body(None, "{}").await, Err(AppError::UnsupportedMediaType(_))));
        let JsonBody(v) = body(Some("application/json"), r#"{"a":1}"#).await.unwrap();
        assert_eq!(v["a"], 1);
    }

    #[tokio::test]
    async fn query_rejections_become_bad_requests() {
        let req = axum::http::Request::builder().uri("/accounts?limit=ten").body(()).unwrap();
        let (mut parts, _) = req.into_parts();
        #[derive(serde::Deserialize)]
        struct Limit {
            #[allow(dead_code)]
            limit: u32,
        }
        let out = QueryParams::<Limit>::from_request_parts(&mut parts, &()).await;
        assert!(matches!(out, Err(AppError::BadRequest(_))));
    }
}
