//! Domain error types for TARA Assistant.
//!
//! Uses thiserror for ergonomic error handling with automatic Display implementations.
//! Every handler returns `AppResult`, so failures always leave the route layer as the
//! `{success: false, error, code}` envelope.

use actix_web::{HttpResponse, ResponseError};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::services::llm::LlmError;

/// Whether internal failure details are exposed to clients (development only).
static VERBOSE_ERRORS: AtomicBool = AtomicBool::new(false);

/// Enable or disable verbose error bodies. Called once at startup.
pub fn set_verbose_errors(enabled: bool) {
    VERBOSE_ERRORS.store(enabled, Ordering::Relaxed);
}

fn verbose_errors() -> bool {
    VERBOSE_ERRORS.load(Ordering::Relaxed)
}

/// Application-level errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// LLM provider call failed or returned an unusable response
    #[error("Provider error: {0}")]
    Provider(String),

    /// LLM provider did not answer within the call timeout
    #[error("Provider timed out after {0}s")]
    ProviderTimeout(u64),

    /// Unexpected internal failure (I/O, task join)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::Provider(_) => "PROVIDER_ERROR",
            AppError::ProviderTimeout(_) => "PROVIDER_TIMEOUT",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to the client.
    ///
    /// Validation and lookup failures are always descriptive; backend failures
    /// are generic unless verbose errors are enabled.
    pub fn public_message(&self) -> String {
        match self {
            AppError::NotFound(_) | AppError::InvalidInput(_) | AppError::ProviderTimeout(_) => {
                self.to_string()
            }
            _ if verbose_errors() => self.to_string(),
            AppError::Database(_) => "An internal database error occurred".to_string(),
            AppError::Provider(_) => "The language model request failed".to_string(),
            _ => "An internal error occurred".to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::ProviderTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Database(_) | AppError::Provider(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::Database(err_str) => tracing::error!("Database error: {}", err_str),
            AppError::Provider(err_str) => tracing::error!("Provider error: {}", err_str),
            AppError::ProviderTimeout(secs) => tracing::warn!("Provider timed out after {}s", secs),
            AppError::Internal(err_str) => tracing::error!("Internal error: {}", err_str),
            _ => {}
        }

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            success: false,
            error: self.public_message(),
            code: self.code().to_string(),
        })
    }
}

/// Error response body matching OpenAPI schema.
#[derive(Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Always false
    pub success: bool,
    /// Human-readable message
    pub error: String,
    /// Machine-readable code
    pub code: String,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.error)
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

// Conversion implementations for common error types

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<LlmError> for AppError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout(duration) => AppError::ProviderTimeout(duration.as_secs()),
            other => AppError::Provider(other.to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
