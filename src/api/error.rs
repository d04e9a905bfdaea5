//! Uniform JSON errors: `{"error": "<kind>", "detail": ...}`.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::error;

use crate::types::VctError;

#[derive(Debug)]
pub enum ApiError {
    /// 404 / 502 / 503 style errors with a readable detail.
    Http(StatusCode, String),
    /// Rejected input, always 422.
    Validation(Value),
    Internal(String),
}

impl ApiError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ApiError::Http(StatusCode::NOT_FOUND, format!("{} not found", what.into()))
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        ApiError::Validation(Value::String(detail.into()))
    }
}

impl From<VctError> for ApiError {
    fn from(err: VctError) -> Self {
        match err {
            VctError::NotFound(what) => ApiError::not_found(what),
            VctError::Validation(msg) | VctError::Parse(msg) => ApiError::validation(msg),
            VctError::AgentUnavailable(msg) => ApiError::Http(StatusCode::SERVICE_UNAVAILABLE, msg),
            VctError::AgentFailed(msg) => ApiError::Http(StatusCode::BAD_GATEWAY, msg),
            VctError::Storage(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<VctError>() {
            Ok(domain) => domain.into(),
            Err(other) => ApiError::Internal(format!("{other:#}")),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, detail) = match self {
            ApiError::Http(status, detail) => (status, "http_error", Value::String(detail)),
            ApiError::Validation(detail) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", detail),
            ApiError::Internal(detail) => {
                error!(detail = %detail, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", Value::String(detail))
            }
        };
        (status, Json(json!({ "error": kind, "detail": detail }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// `Json` whose rejections use the uniform error body.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

/// Query string extractor that accepts repeated keys (`event_id=1&event_id=2`).
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let axum_extra::extract::Query(value) =
            axum_extra::extract::Query::<T>::from_request_parts(parts, state)
                .await
                .map_err(|e| ApiError::validation(e.to_string()))?;
        Ok(ApiQuery(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(resp: Response) -> Value {
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_domain_errors_map_to_status() {
        let resp = ApiError::from(anyhow::Error::new(VctError::NotFound("Match 7".into()))).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = body_json(resp).await;
        assert_eq!(json["error"], "http_error");
        assert_eq!(json["detail"], "Match 7 not found");

        let resp = ApiError::from(VctError::AgentUnavailable("missing".into())).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let resp = ApiError::from(VctError::Parse("bad".into())).into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_other_errors_are_internal() {
        let resp = ApiError::from(anyhow::anyhow!("disk on fire")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(resp).await;
        assert_eq!(json["error"], "internal_error");
        assert_eq!(json["detail"], "disk on fire");
    }
}
