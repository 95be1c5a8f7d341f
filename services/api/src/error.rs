//! Custom error types for the API service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::error::DatabaseError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::engine::EngineError;

/// Custom error type for the API service
#[derive(Error, Debug)]
pub enum ApiError {
    /// Unauthorized access
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate booking, waitlist entry or class slot
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The class is full; the client may join the waitlist
    #[error("Capacity: {0}")]
    Capacity(String),

    /// Bad request with message
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error
    #[error("Internal server error")]
    InternalServerError,

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) | ApiError::Capacity(_) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Database(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::InternalServerError | ApiError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(msg) => ApiError::NotFound(msg),
            EngineError::Forbidden(msg) => ApiError::Forbidden(msg),
            EngineError::Conflict(msg) => ApiError::Conflict(msg),
            EngineError::Capacity(msg) => ApiError::Capacity(msg),
            EngineError::InvalidState(msg) | EngineError::Rejected(msg) => {
                ApiError::BadRequest(msg)
            }
            EngineError::Database(e) => {
                error!("Database error in engine: {}", e);
                ApiError::InternalServerError
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Unauthorized => json!({ "error": "Unauthorized" }),
            ApiError::Capacity(msg) => json!({ "error": msg, "canJoinWaitlist": true }),
            ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::BadRequest(msg) => json!({ "error": msg }),
            ApiError::InternalServerError => json!({ "error": "Internal server error" }),
            ApiError::Database(e) if e.is_client_error() => json!({ "error": e.to_string() }),
            ApiError::Database(e) => {
                error!("Database error: {}", e);
                json!({ "error": "Database error" })
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;

/// Log an unexpected failure and hide it behind a 500
pub fn internal(context: &str) -> impl FnOnce(anyhow::Error) -> ApiError + '_ {
    move |e| {
        error!("{}: {:#}", context, e);
        ApiError::InternalServerError
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_capacity_error_offers_waitlist() {
        let full = EngineError::Capacity("Class is full".to_string());
        let (status, body) = body_of(full.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Class is full");
        assert_eq!(body["canJoinWaitlist"], true);
    }

    #[tokio::test]
    async fn test_engine_errors_map_to_statuses() {
        let cases = [
            (EngineError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (EngineError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (EngineError::Conflict("x".into()), StatusCode::BAD_REQUEST),
            (EngineError::InvalidState("x".into()), StatusCode::BAD_REQUEST),
            (EngineError::Rejected("x".into()), StatusCode::BAD_REQUEST),
            (
                EngineError::Database(sqlx::Error::RowNotFound),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (engine_error, expected) in cases {
            let api_error: ApiError = engine_error.into();
            assert_eq!(api_error.status(), expected);
        }
    }

    #[tokio::test]
    async fn test_constraint_violations_are_bad_requests() {
        let err = ApiError::from(DatabaseError::ConstraintViolation(
            "packages_classes_remaining_check".to_string(),
        ));
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Value violates packages_classes_remaining_check");

        let (status, body) = body_of(DatabaseError::Query(sqlx::Error::PoolTimedOut).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Database error");
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        let (status, body) = body_of(internal("Failed")(anyhow::anyhow!("secret"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
        assert!(body.get("canJoinWaitlist").is_none());
    }
}
