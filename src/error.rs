//! Unified error handling for the HTTP surface.
//!
//! Every handler returns `Result<_, ApiError>`. Errors render as
//! `{"success": false, "error": "<message>"}` with a matching status code
//! and carry a static code used as a metrics label.

use crate::db::DbError;
use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Error code attached to error responses for the route metrics layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(pub &'static str);

/// Errors a request handler can return.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication required.")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found.")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Too many attempts. Please try again later.")]
    RateLimited,

    #[error("Something went wrong. Please try again.")]
    Internal(String),
}

impl ApiError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::RateLimited => "rate_limited",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => Self::NotFound(what),
            DbError::AccountNotFound(what) => Self::NotFound(what),
            DbError::AlreadyExists(msg) => Self::Conflict(msg),
            DbError::AccountExists(name) => {
                Self::Conflict(format!("An account for {name} already exists."))
            }
            DbError::InsufficientAccess(msg) => Self::Forbidden(msg),
            DbError::Invalid(msg) => Self::Validation(msg),
            DbError::InvalidPassword => Self::BadRequest("Invalid email or password.".to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::BadRequest(format!("Invalid upload: {}", err.body_text()))
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            tracing::error!(error = %detail, "Request failed");
        }
        let body = Json(json!({ "success": false, "error": self.to_string() }));
        let mut response = (self.status(), body).into_response();
        response.extensions_mut().insert(ErrorCode(self.error_code()));
        response
    }
}

/// Result type for request handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_and_statuses() {
        assert_eq!(ApiError::Unauthenticated.error_code(), "unauthenticated");
        assert_eq!(ApiError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ApiError::Internal("boom".into()).to_string(),
            "Something went wrong. Please try again."
        );
    }

    #[test]
    fn db_errors_map_to_statuses() {
        let cases = [
            (DbError::NotFound("Chat".into()), StatusCode::NOT_FOUND),
            (DbError::AlreadyExists("taken".into()), StatusCode::CONFLICT),
            (DbError::InsufficientAccess("no".into()), StatusCode::FORBIDDEN),
            (DbError::Invalid("short".into()), StatusCode::BAD_REQUEST),
            (DbError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (db, status) in cases {
            assert_eq!(ApiError::from(db).status(), status);
        }
        assert_eq!(
            ApiError::from(DbError::NotFound("Chat".into())).to_string(),
            "Chat not found."
        );
    }

    #[tokio::test]
    async fn response_body_shape() {
        let response = ApiError::forbidden("Unauthorized").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.extensions().get::<ErrorCode>(),
            Some(&ErrorCode("forbidden"))
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"success": false, "error": "Unauthorized"}));
    }
}
