//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// SQLSTATE for unique_violation.
const PG_UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("duplicate resource name: {0}")]
    DuplicateResource(String),
    #[error("resource hierarchy cycle through '{0}'")]
    Cycle(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("malformed criteria: {0}")]
    MalformedCriteria(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("insufficient privilege")]
    Forbidden,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.code().as_deref() == Some(PG_UNIQUE_VIOLATION) {
                return AppError::Conflict(db.message().to_string());
            }
        }
        AppError::Internal(e.to_string())
    }
}

impl AppError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        AppError::MalformedCriteria(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::MalformedCriteria(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
        }
    }

    /// (name, messageCode) pair of the JSON envelope.
    fn codes(&self) -> (&'static str, &'static str) {
        match self {
            AppError::Config(_) => ("InternalServerError", "ConfigError"),
            AppError::Internal(_) => ("InternalServerError", "RunTimeError"),
            AppError::MalformedCriteria(_) => ("BadRequest", "MalformedCriteria"),
            AppError::BadRequest(_) => ("BadRequest", "BadRequest"),
            AppError::UnsupportedMediaType(_) => ("UnsupportedMediaType", "UnsupportedMediaType"),
            AppError::PayloadTooLarge(_) => ("PayloadTooLarge", "PayloadTooLarge"),
            AppError::Forbidden => ("Forbidden", "Forbidden"),
            AppError::NotFound(_) => ("NotFound", "NotFound"),
            AppError::Conflict(_) => ("Conflict", "Conflict"),
        }
    }
}

/// Error envelope returned by every route.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub name: String,
    pub message: String,
    pub message_code: String,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn from_error(err: &AppError) -> Self {
        let (name, message_code) = err.codes();
        let context = match err {
            AppError::NotFound(id) => Some(serde_json::json!({ "id": id })),
            _ => None,
        };
        ErrorBody {
            name: name.to_string(),
            message: err.to_string(),
            message_code: message_code.to_string(),
            status_code: err.status().as_u16(),
            context,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(ErrorBody::from_error(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_status_and_codes() {
        let body = ErrorBody::from_error(&AppError::NotFound("A1".into()));
        assert_eq!(body.status_code, 404);
        assert_eq!(body.name, "NotFound");
        assert_eq!(body.context, Some(serde_json::json!({ "id": "A1" })));

        let json = serde_json::to_value(ErrorBody::from_error(&AppError::malformed("x"))).unwrap();
        assert_eq!(json["messageCode"], "MalformedCriteria");
        assert_eq!(json["statusCode"], 400);
        assert!(json.get("context").is_none());
    }

    #[test]
    fn non_database_sqlx_errors_are_internal() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
