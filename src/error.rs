use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::storage::StorageError;

/// The error taxonomy. Each kind carries its own HTTP status and a
/// machine-readable `code`; handlers never pick wording, the core never
/// encodes UX copy.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("authentication failed")]
    Authentication(String),
    #[error("insufficient permissions")]
    Authorization(String),
    #[error("not found")]
    NotFound(String),
    #[error("conflict")]
    Conflict(String),
    #[error("rate limited")]
    RateLimited { retry_after_seconds: u64 },
    #[error("internal error")]
    Internal(String),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::Authentication(_) => "authentication_failed",
            AppError::Authorization(_) => "insufficient_permissions",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Validation(m)
            | AppError::Authentication(m)
            | AppError::Authorization(m)
            | AppError::NotFound(m)
            | AppError::Conflict(m)
            | AppError::Internal(m) => m.clone(),
            AppError::RateLimited { retry_after_seconds } => {
                format!("rate limit exceeded, retry after {retry_after_seconds}s")
            }
        }
    }
}

/// The error envelope: `{error, message, status, details}`.
#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: &'static str,
    message: String,
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let mut details = None;
        if let AppError::RateLimited { retry_after_seconds } = &self {
            details = Some(serde_json::json!({ "retry_after_seconds": retry_after_seconds }));
        }
        let body = ErrorEnvelope {
            error: self.code(),
            message: self.message(),
            status: status.as_u16(),
            details,
        };
        (status, Json(body)).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(m) => AppError::NotFound(m),
            StorageError::Conflict(m) => AppError::Conflict(m),
            StorageError::Internal(m) => AppError::Internal(m),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
