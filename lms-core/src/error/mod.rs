//! Unified error handling for LMS Core

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Every violated eligibility rule, in evaluation order.
    #[error("Enrollment not allowed: {}", reasons.join("; "))]
    IneligibleEnrollment { reasons: Vec<String> },

    #[error("Circular prerequisite: {0}")]
    CyclicPrerequisite(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True when the storage layer rejected a write on a unique key.
    ///
    /// Concurrent enrollment writers rely on this to tell "lost the race" apart
    /// from genuine failures.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            AppError::Database(sqlx::Error::Database(db_err)) => {
                if db_err.is_unique_violation() {
                    return true;
                }
                let msg = db_err.message().to_lowercase();
                msg.contains("duplicate entry") || msg.contains("unique constraint")
            }
            _ => false,
        }
    }

    /// True for a lock wait deadlock, which racing `SELECT ... FOR UPDATE` on a
    /// missing row can produce in MySQL.
    pub fn is_lock_conflict(&self) -> bool {
        match self {
            AppError::Database(sqlx::Error::Database(db_err)) => {
                db_err.code().as_deref() == Some("40001")
                    || db_err.message().to_lowercase().contains("deadlock")
            }
            _ => false,
        }
    }

    /// Collapse storage-engine errors into the generic internal kind.
    ///
    /// Domain kinds pass through untouched so callers keep branching on them.
    pub fn into_domain(self, context: &str) -> AppError {
        match self {
            AppError::Database(e) => {
                tracing::error!(error = ?e, "{}", context);
                AppError::Internal(anyhow::anyhow!("{}: {}", context, e))
            }
            AppError::Cache(msg) => {
                tracing::error!(error = %msg, "{}", context);
                AppError::Internal(anyhow::anyhow!("{}: {}", context, msg))
            }
            other => other,
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::Cache(e.to_string())
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut details = None;
        let (status, error_type, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "validation", msg.clone()),
            AppError::IneligibleEnrollment { reasons } => {
                details = Some(serde_json::json!({ "reasons": reasons }));
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "ineligible_enrollment",
                    "User is not eligible to enroll in this course".to_string(),
                )
            }
            AppError::CyclicPrerequisite(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "cyclic_prerequisite",
                msg.clone(),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Cache(msg) => {
                tracing::error!("Cache error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "cache_error",
                    "A cache error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred, please try again or contact support".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

// Conversion from validation errors
impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}
